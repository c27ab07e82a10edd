pub mod association;
pub mod health_check;

pub mod app_state;
pub mod association_membership;
pub mod authentication;
pub mod configuration;
pub mod customers;
pub mod domain;
pub mod routes;
pub mod startup;
pub mod stripe_client;
pub mod telemetry;

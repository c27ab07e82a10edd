mod customer;
mod customer_email;
mod stripe;
mod subscription;
mod subscription_invoice;
mod subscription_status;

pub use customer::{Customer, UserId};
pub use customer_email::CustomerEmail;
pub use stripe::{StripeCheckoutSession, StripeCustomer, StripeSubscription};
pub use subscription::Subscription;
pub use subscription_invoice::{InvoiceStatus, NewSubscriptionInvoice, SubscriptionInvoice};
pub use subscription_status::SubscriptionStatus;

mod health;
mod inventory;
mod poll;
mod webhooks;

pub use health::health_handler;
pub use inventory::{get_inventory, get_inventory_audit};
pub use poll::trigger_poll;
pub use webhooks::marketplace_a_webhook;

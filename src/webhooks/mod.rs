// Provider webhooks
//
// Signature-checked endpoint feeding the append-only redemption ledger.

pub mod error;
pub mod events;
pub mod handlers;
pub mod ledger;

pub use error::WebhookError;
pub use events::WebhookEvent;
pub use handlers::WebhookAck;
pub use ledger::{RedemptionLedger, WebhookOutcome};

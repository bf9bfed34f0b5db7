pub mod channel;
pub mod error;
pub mod history;
pub mod throttle;
pub mod webhook;

pub use channel::{Alert, ConsoleChannel, NotificationChannel};
pub use error::NotifyError;
pub use history::HistoryStore;
pub use throttle::{ThrottleManager, ThrottlePolicy};
pub use webhook::WebhookChannel;

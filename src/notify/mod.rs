pub mod buffer;
pub mod gate;
pub mod mailer;
pub mod traits;

pub use buffer::NotificationBuffer;
pub use gate::{DeliveryReport, GateOutcome, NotificationGate};
pub use mailer::{HttpMailNotifier, LogNotifier};
pub use traits::{Clock, Email, Notifier, SystemClock};

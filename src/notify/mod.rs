//! Notification pipeline: who to tell, what to say, and telling them once.

mod audience;
mod dispatch;
mod render;
mod sink;

pub use audience::{Audience, PgAudience, RecipientRef, StaticAudience};
pub use dispatch::{
    DispatchReport, NotificationDispatcher, NotificationLoop, NotificationSelector, PassSummary,
    StartWindow,
};
pub use render::{escape_markdown, render};
pub use sink::{LogNotifier, Notifier, RedisStreamNotifier, OUTBOUND_STREAM};

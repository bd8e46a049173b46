// Domain models

mod reading;
mod summary;
mod user;

pub use reading::{Channel, Reading};
pub use summary::{AggregateSummary, ChannelStats};
pub use user::{DataOverview, HealthAverages, Role, User, UserDataCount};

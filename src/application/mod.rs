pub mod dispatcher;

pub use dispatcher::{DispatchEvent, Dispatcher, DispatcherHandle, DispatcherStats, Subscription};

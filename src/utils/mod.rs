pub mod bitmap;

mod log;
mod other;

pub use self::log::init_log;
pub use other::HandyRwLock;

mod handy_lock;
pub mod io;
mod log;

pub use handy_lock::HandyRwLock;
pub use log::init_log;

pub mod commerce;
pub mod server;
pub mod storage;

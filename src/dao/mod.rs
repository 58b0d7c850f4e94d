/// Database model definitions and change notifications.
pub mod models;
/// Remote session store contract and its backends.
pub mod session_store;
/// Storage abstraction layer errors.
pub mod storage;

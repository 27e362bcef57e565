pub mod clock;
pub mod db;
pub mod memory;
pub mod model;
pub mod records;
pub mod vault;

pub use clock::{Clock, ManualClock, SystemClock};
pub use db::RedbStore;
pub use memory::MemoryStore;
pub use model::{Admission, NewSecret, SecretRecord};
pub use records::{RecordStore, Taken};
pub use vault::{Limits, Vault};

pub mod dedup;
pub mod delivery;
pub mod events;
pub mod presence;

pub use dedup::DedupWindow;
pub use delivery::{DeleteScope, DeletionNotice, DeliveryEngine};
pub use events::{ClientEvent, ServerEvent};
pub use presence::PresenceTable;

pub mod conversations;
pub mod messages;
pub mod models;
pub mod sessions;
pub mod users;

pub use conversations::ConversationRepository;
pub use messages::MessageRepository;
pub use models::{Conversation, Message, Session, User};
pub use sessions::SessionRepository;
pub use users::UserRepository;

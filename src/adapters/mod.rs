pub mod channel;
pub mod extractor;
pub mod result_source;
pub mod telegram;

pub use channel::{ChannelOp, DryRunChannel, MessagingApi, OpKind, ScriptedFailure};
pub use extractor::{BlockTextExtractor, ResultExtractor};
pub use result_source::{HttpResultSource, ResultSource, ScriptedSource};
pub use telegram::{decode_response, IncomingMessage, TelegramClient, Update, User};

// Wire protocol shared by the daemon and clients.

pub mod command;

pub use command::{
    ClientCommand, CreateRequest, DocumentView, ErrorCode, ErrorPayload, MatchedLine,
    SaveRequest, SearchResult, ServerMessage, TextRequest,
};

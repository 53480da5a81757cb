pub mod history_store;
pub mod response_parser;
pub mod sanitize;
pub mod table_store;
pub mod taxonomy;

pub use history_store::HistoryStore;
pub use response_parser::{parse_answer, ExtractStrategy, LabeledStrategy, ParsedAnswer, ResponseParser};
pub use table_store::TableStore;

pub mod item_ctx;
pub mod item_flow;
pub mod news_flow;

pub use item_ctx::ItemCtx;
pub use item_flow::ItemProcessor;
pub use news_flow::NewsFlow;

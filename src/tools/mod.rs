pub mod calculator;
pub mod executor;
pub mod registry;
pub mod schema;
pub mod stock_price;

pub use calculator::CalculatorTool;
pub use executor::{ToolExecutor, DEFAULT_TOOL_TIMEOUT};
pub use registry::{RegistryError, Tool, ToolDefinition, ToolRegistry};
pub use schema::tool_call_schema_json;
pub use stock_price::{
    HttpQuoteSource, Quote, QuoteError, QuoteSource, StaticQuotes, StockPriceTool,
};

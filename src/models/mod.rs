mod api;

pub use api::{
    BlockParams, BlockResponse, ConfigurationSummary, HealthResponse, StatsResponse,
    UnblockResponse,
};

//! User-callback RPC plumbing: the cached transport and its access
//! profiler.

pub mod cached;
pub mod profiler;

pub use cached::{
    CachePolicy, CachedRpcTransport, InnerCall, InnerResult, ReadContractParams,
    UNCACHED_RESPONSES,
};
pub use profiler::{
    AccessProfiler, DB_PREDICTION_THRESHOLD, MAX_CONSTANT_PATTERN_COUNT, PatternValue,
    PredictedCall, ProfilePattern, RPC_PREDICTION_THRESHOLD, SAMPLING_RATE,
};

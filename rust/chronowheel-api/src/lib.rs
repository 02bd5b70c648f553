// chronowheel-api: the thin HTTP shell (§6) plus the ingress adapter's
// validation and publish logic (§4.5). Everything delivery-side — retries,
// backoff, acknowledgement — lives in chronowheel-dispatch and never
// surfaces here; only validation failures and "not accepting requests
// right now" reach an HTTP caller (§7).

pub mod error;
pub mod ingress;
pub mod routes;
pub mod state;

pub use error::ApiError;
pub use routes::{router, DelayRequest, DelayResponse, StatsResponse};
pub use state::AppState;

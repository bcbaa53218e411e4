pub mod conversations;
pub mod error;
pub mod middleware;
pub mod profiles;
pub mod realtime;
pub mod routes;
pub mod state;
pub mod users;

pub use routes::router;
pub use state::{AppState, AppStateInner};

use std::sync::Arc;

use axum::extract::FromRef;
use drawdeck_collab::{Collab, PgDatabase};

pub type Db = PgDatabase;

#[derive(Clone, FromRef)]
pub struct ServerContext {
    pub collab: Arc<Collab<Db>>,
}

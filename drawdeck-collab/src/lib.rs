mod auth;
mod canvas;
mod chat;
mod db;
mod events;
mod sessions;

pub mod util;

use std::sync::Arc;

pub use auth::*;
pub use canvas::*;
pub use chat::*;
pub use db::*;
pub use events::*;
pub use sessions::*;

/// The drawdeck collab system, coordinating shared drawing sessions:
/// authentication, room membership, canvas relay, and chat.
pub struct Collab<Db> {
    pub auth: Auth<Db>,
    pub sessions: SessionManager<Db>,
    pub canvas: CanvasRelay<Db>,
    pub chat: Chat<Db>,

    context: CollabContext<Db>,
}

/// A type passed to the components of the collab system, to access
/// shared state and deliver events.
pub struct CollabContext<Db> {
    pub database: Arc<Db>,
    pub registry: Arc<SessionRegistry>,
    pub canvases: CanvasStore,
}

impl<Db> Collab<Db>
where
    Db: Database,
{
    pub fn new(database: Db) -> Self {
        let database = Arc::new(database);

        let context = CollabContext {
            database: database.clone(),
            registry: Arc::new(SessionRegistry::new()),
            canvases: CanvasStore::default(),
        };

        Self {
            auth: Auth::new(&database),
            sessions: SessionManager::new(&context),
            canvas: CanvasRelay::new(&context),
            chat: Chat::new(&context),
            context,
        }
    }

    pub fn database(&self) -> &Arc<Db> {
        &self.context.database
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.context.registry
    }

    pub fn canvases(&self) -> &CanvasStore {
        &self.context.canvases
    }
}

impl<Db> Clone for CollabContext<Db> {
    fn clone(&self) -> Self {
        Self {
            database: self.database.clone(),
            registry: self.registry.clone(),
            canvases: self.canvases.clone(),
        }
    }
}

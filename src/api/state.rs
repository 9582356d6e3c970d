use std::sync::Arc;

use sqlx::{Pool, Sqlite};

use crate::config::Config;
use crate::realtime::{DedupWindow, DeliveryEngine, PresenceTable};

#[derive(Clone)]
pub struct AppState {
    pub db: Pool<Sqlite>,
    pub config: Arc<Config>,
    pub presence: Arc<PresenceTable>,
    pub dedup: Arc<DedupWindow>,
    pub delivery: Arc<DeliveryEngine>,
}

impl AppState {
    pub fn new(db: Pool<Sqlite>, config: Arc<Config>) -> Self {
        let presence = Arc::new(PresenceTable::new());
        let dedup = Arc::new(DedupWindow::new());
        let delivery = Arc::new(DeliveryEngine::new(
            db.clone(),
            presence.clone(),
            dedup.clone(),
        ));

        Self {
            db,
            config,
            presence,
            dedup,
            delivery,
        }
    }
}

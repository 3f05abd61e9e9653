use std::sync::Arc;

use crate::config::AppConfig;
use crate::services::driving::DrivingSessions;
use crate::services::flow_registry::FlowRegistry;
use crate::services::notices::NoticeBus;
use crate::services::session::{SessionProvider, Subscription};
use crate::services::sync::SyncAdapter;

pub struct AppState {
    pub config: AppConfig,
    pub sync: SyncAdapter,
    pub notices: NoticeBus,
    pub sessions: Arc<dyn SessionProvider>,
    pub flows: Arc<FlowRegistry>,
    /// Driving mode per signed-in session, keyed by access token.
    pub driving: Arc<DrivingSessions>,
    // ends a session's driving mode when it signs out
    _sign_out_watch: Subscription,
}

impl AppState {
    pub fn new(config: AppConfig, sync: SyncAdapter, sessions: Arc<dyn SessionProvider>) -> Self {
        let notices = sync.notices().clone();
        let flows = Arc::new(FlowRegistry::new(config.flow_idle));
        let driving = Arc::new(DrivingSessions::new(config.driving_refresh));

        let watched = Arc::clone(&driving);
        let sign_out_watch = sessions.subscribe(Box::new(move |token, session| {
            if session.is_none() && watched.end(token) {
                tracing::debug!("driving mode ended with its session");
            }
        }));

        Self {
            config,
            sync,
            notices,
            sessions,
            flows,
            driving,
            _sign_out_watch: sign_out_watch,
        }
    }
}

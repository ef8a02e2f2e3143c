use std::sync::Arc;

use kaogong_llm::ChatClient;
use kaogong_persist::PersistenceClient;

use crate::config::Config;
use crate::services::sms::CodeSender;
use crate::services::tokens::TokenIssuer;

/// Shared application state passed to all handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub persist: Arc<dyn PersistenceClient>,
    pub llm_client: Arc<dyn ChatClient>,
    pub code_sender: Arc<dyn CodeSender>,
    pub tokens: TokenIssuer,
}

impl AppState {
    pub fn new(
        config: Config,
        persist: Arc<dyn PersistenceClient>,
        llm_client: Arc<dyn ChatClient>,
        code_sender: Arc<dyn CodeSender>,
    ) -> Self {
        let tokens = TokenIssuer::new(&config.jwt_secret, config.auth.token_ttl_hours);
        Self {
            config: Arc::new(config),
            persist,
            llm_client,
            code_sender,
            tokens,
        }
    }
}

pub mod schema;

pub use schema::{
    AiConfig, Config, GatewayConfig, OAuthConfig, RendererConfig, SessionConfig,
    DEFAULT_OAUTH_SCOPES,
};

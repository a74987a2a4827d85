use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};

use crate::{
    handler::{self, auth::tokens::RefreshRequest, health::Health, ErrorResponse},
    service::auth::{AuthResponse, ProfileResponse, TokenPairResponse},
};

struct BearerAuth;

impl Modify for BearerAuth {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        handler::health::health,
        handler::auth::google::start_google_auth,
        handler::auth::google::google_callback,
        handler::auth::tokens::refresh,
        handler::me::me
    ),
    components(schemas(
        Health,
        ErrorResponse,
        AuthResponse,
        ProfileResponse,
        TokenPairResponse,
        RefreshRequest
    )),
    modifiers(&BearerAuth),
    tags(
        (name = "health", description = "Health check"),
        (name = "auth", description = "Federated sign-in and tokens")
    )
)]
pub struct ApiDoc;

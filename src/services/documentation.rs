use utoipa::OpenApi;

#[derive(OpenApi)]
/// Aggregated OpenAPI specification for Masbaha Back.
#[openapi(
    paths(
        crate::routes::health::healthcheck,
        crate::routes::rooms::create_room,
        crate::routes::rooms::get_room,
        crate::routes::rooms::room_action,
    ),
    components(
        schemas(
            crate::dto::health::HealthResponse,
            crate::dto::health::HealthStatus,
            crate::dto::room::CreateRoomRequest,
            crate::dto::room::RoomDto,
            crate::dto::room::ParticipantDto,
            crate::dto::room::RoomSnapshotResponse,
            crate::dto::action::ActionKind,
            crate::dto::action::ActionRequest,
            crate::dto::action::ActionResponse,
            crate::dto::action::JoinPayload,
            crate::dto::action::JoinParticipant,
            crate::dto::action::TapPayload,
            crate::dto::action::UpdateTargetPayload,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "rooms", description = "Room creation, snapshots and member actions"),
    )
)]
pub struct ApiDoc;

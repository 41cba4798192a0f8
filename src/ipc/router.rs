use super::handlers;
use super::types::{AppState, Request};
use crate::ipc::error::err;

pub fn handle_request(state: &mut AppState, req: Request) -> serde_json::Value {
    if let Some(resp) = handlers::core::try_handle(state, &req) {
        return resp;
    }
    if let Some(resp) = handlers::auth::try_handle(state, &req) {
        return resp;
    }
    if let Some(resp) = handlers::dashboard::try_handle(state, &req) {
        return resp;
    }
    if let Some(resp) = handlers::users::try_handle(state, &req) {
        return resp;
    }
    if let Some(resp) = handlers::students::try_handle(state, &req) {
        return resp;
    }
    if let Some(resp) = handlers::teachers::try_handle(state, &req) {
        return resp;
    }
    if let Some(resp) = handlers::classes::try_handle(state, &req) {
        return resp;
    }
    if let Some(resp) = handlers::spp_payments::try_handle(state, &req) {
        return resp;
    }
    if let Some(resp) = handlers::letters::try_handle(state, &req) {
        return resp;
    }
    if let Some(resp) = handlers::certificate_pickups::try_handle(state, &req) {
        return resp;
    }
    if let Some(resp) = handlers::student_transfers::try_handle(state, &req) {
        return resp;
    }
    if let Some(resp) = handlers::student_cards::try_handle(state, &req) {
        return resp;
    }
    if let Some(resp) = handlers::school_profile::try_handle(state, &req) {
        return resp;
    }
    if let Some(resp) = handlers::backgrounds::try_handle(state, &req) {
        return resp;
    }
    if let Some(resp) = handlers::backup::try_handle(state, &req) {
        return resp;
    }

    err(
        &req.id,
        "not_implemented",
        format!("unknown method: {}", req.method),
        None,
    )
}

//! The person route table.
//!
//! | Route | Handler |
//! |---|---|
//! | `GET /person/{id}`, accepting JSON | [`get_person`] |
//! | `GET /person`, accepting JSON | [`list_people`] |
//! | `POST /person`, sending JSON | [`create_person`] |
//! | `DELETE /person/{id}` | [`delete_person`] |
//! | `GET /health` | plain-text liveness check |

use fnroute::core::BodyError;
use fnroute::prelude::*;
use fnroute::server::{access_log, request_id, SecurityHeaders};
use http::HeaderName;
use serde_json::json;

use crate::repository::{NewPerson, PersonRepository};

fn person_id(request: &RequestView) -> RouteResult<u64> {
    let raw = request.path_variable("id").unwrap_or_default();
    raw.parse()
        .map_err(|_| RouteError::BadRequest(format!("invalid person id '{raw}'")))
}

/// Returns one person as JSON, or 404.
pub fn get_person(repo: PersonRepository) -> HandlerFn {
    HandlerFn::new(move |request: RequestView| {
        let repo = repo.clone();
        async move {
            let id = person_id(&request)?;
            match repo.get(id).await {
                Some(person) => Response::ok().json(&person).build(),
                None => Response::not_found()
                    .json(&json!({ "error": format!("no person with id {id}") }))
                    .build(),
            }
        }
    })
}

/// Returns every person as a JSON array.
pub fn list_people(repo: PersonRepository) -> HandlerFn {
    HandlerFn::new(move |_request: RequestView| {
        let repo = repo.clone();
        async move { Response::ok().json(&repo.all().await).build() }
    })
}

/// Creates a person from a JSON body.
///
/// Undecodable bodies get a 400 and blank names a 422, both with a JSON
/// error message.
pub fn create_person(repo: PersonRepository) -> HandlerFn {
    HandlerFn::new(move |request: RequestView| {
        let repo = repo.clone();
        async move {
            match request.json::<NewPerson>().await {
                Ok(person) if person.name.trim().is_empty() => Response::unprocessable_entity()
                    .json(&json!({ "error": "name must not be empty" }))
                    .build(),
                Ok(person) => {
                    let person = repo.save(person).await;
                    tracing::info!(id = person.id, "person created");
                    Response::created(&format!("/person/{}", person.id))
                        .json(&person)
                        .build()
                }
                Err(BodyError::Decode(err)) => Response::bad_request()
                    .json(&json!({ "error": err.message }))
                    .build(),
                Err(err) => Err(err.into()),
            }
        }
    })
}

/// Deletes a person; 204 on success, 404 if unknown.
pub fn delete_person(repo: PersonRepository) -> HandlerFn {
    HandlerFn::new(move |request: RequestView| {
        let repo = repo.clone();
        async move {
            let id = person_id(&request)?;
            if repo.delete(id).await {
                Response::no_content().build()
            } else {
                Response::not_found().build()
            }
        }
    })
}

/// Builds the route table over `repo`.
pub fn router(repo: &PersonRepository) -> RouteResult<RouterFunction> {
    let accepts_json = || Predicate::accept(mime::APPLICATION_JSON);
    RouterFunction::builder()
        .get_with("/person/{id}", accepts_json(), get_person(repo.clone()))
        .get_with("/person", accepts_json(), list_people(repo.clone()))
        .post_with(
            "/person",
            Predicate::content_type(mime::APPLICATION_JSON),
            create_person(repo.clone()),
        )
        .delete("/person/{id}", delete_person(repo.clone()))
        .get("/health", |_request: RequestView| async {
            Response::ok().text("ok").build()
        })
        .build()
}

/// Builds the dispatcher: the route table plus access logging, request ids
/// and security headers.
pub fn dispatcher(repo: &PersonRepository, settings: Settings) -> RouteResult<Dispatcher> {
    let request_id_header = HeaderName::from_bytes(settings.request_id_header.as_bytes())
        .map_err(|e| RouteError::Configuration(format!("invalid request id header: {e}")))?;
    Ok(Dispatcher::new(router(repo)?)
        .settings(settings)
        .filter(access_log())
        .filter(request_id(request_id_header))
        .filter(SecurityHeaders::default().into_filter()))
}

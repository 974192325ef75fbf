//! Tests for the router module.
//!
//! This module contains tests for:
//! - First-match dispatch, non-match continuation and pass-through
//! - Resolver states as seen through dispatch
//! - Activation rollback and teardown assertions
//! - Call history projections
//! - Concurrency of sequence resolvers and cancellation of async side effects

use super::*;
use crate::error::{Error, Result};
use crate::http::{MockResponse, Request, ResponseTemplate};
use crate::predicate::{Captures, Expr, Field, Lookup};
use crate::resolver::{RaiseSpec, SequenceItem};
use hyper::StatusCode;
use serde_json::json;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing_test::traced_test;

#[derive(Debug, thiserror::Error)]
#[error("connection error")]
struct ConnectError;

#[derive(Debug, thiserror::Error)]
#[error("saw {0} earlier calls")]
struct SeenCalls(usize);

fn get(url: &str) -> Request {
    Request::get(url).unwrap()
}

fn status(outcome: Result<Outcome>) -> u16 {
    outcome
        .unwrap()
        .response()
        .expect("expected a mocked response")
        .status_code()
}

fn lenient() -> Router {
    Router::new(RouterSettings::default().assert_all_mocked(false)).unwrap()
}

fn text(status: u16, body: &str) -> MockResponse {
    MockResponse::new(StatusCode::from_u16(status).unwrap()).with_text(body)
}

// ===== Dispatch =====

#[test]
fn test_first_match_wins_in_registration_order() {
    let router = Router::default();
    router.get("https://example.org/users").unwrap().respond(200u16).unwrap();
    router
        .route(Expr::host("example.org").unwrap())
        .unwrap()
        .respond(202u16)
        .unwrap();

    assert_eq!(status(router.dispatch(&get("https://example.org/users"))), 200);
    assert_eq!(status(router.dispatch(&get("https://example.org/teams"))), 202);

    let reordered = Router::default();
    reordered
        .route(Expr::host("example.org").unwrap())
        .unwrap()
        .respond(202u16)
        .unwrap();
    reordered.get("https://example.org/users").unwrap().respond(200u16).unwrap();
    assert_eq!(status(reordered.dispatch(&get("https://example.org/users"))), 202);
}

#[test]
fn test_side_effect_none_continues_without_recording() {
    let router = Router::default();
    let declining = router
        .route(Expr::any())
        .unwrap()
        .side_effect(|_req: &Request, _caps: &Captures| None::<MockResponse>);
    let fallback = router.get("https://example.org/").unwrap().respond(201u16).unwrap();

    assert_eq!(status(router.dispatch(&get("https://example.org/"))), 201);
    assert_eq!(declining.call_count(), 0);
    assert_eq!(fallback.call_count(), 1);
    assert_eq!(router.calls().len(), 1);
    assert_eq!(router.calls()[0].route_id, Some(fallback.id()));
}

#[test]
fn test_side_effect_returning_request_passes_through() {
    let router = lenient();
    let route = router
        .get("https://example.org/")
        .unwrap()
        .side_effect(|req: &Request, _caps: &Captures| req.clone());

    let outcome = router.dispatch(&get("https://example.org/")).unwrap();
    assert_eq!(outcome, Outcome::PassThrough);
    assert!(route.calls().last().unwrap().is_pass_through());

    let outcome = router.dispatch(&get("https://example.org/other")).unwrap();
    assert_eq!(outcome, Outcome::Unmocked);
    let last = router.calls();
    let last = last.last().unwrap();
    assert!(last.is_unmocked());
    assert_eq!(last.route_id, None);
    assert_eq!(route.call_count(), 1);
}

#[test]
fn test_side_effect_returning_other_request_is_error() {
    let router = Router::default();
    router
        .route(Expr::any())
        .unwrap()
        .side_effect(|_req: &Request, _caps: &Captures| get("https://elsewhere.org/"));

    let err = router.dispatch(&get("https://example.org/")).unwrap_err();
    assert!(matches!(err, Error::ForeignRequest { .. }));
    assert!(router.calls().is_empty());
}

#[test]
fn test_regex_captures_reach_side_effect() {
    let router = Router::default();
    router
        .route(Expr::url_regex(r"https://example.org/(?P<slug>\w+)/").unwrap())
        .unwrap()
        .side_effect(|_req: &Request, caps: &Captures| {
            text(200, caps.get("slug").unwrap_or("missing"))
        });

    let outcome = router.dispatch(&get("https://example.org/foobar/")).unwrap();
    assert_eq!(outcome.response().unwrap().text(), "foobar");
}

#[test]
fn test_sequence_repeats_last_item() {
    let router = Router::default();
    let route = router
        .get("https://example.org/")
        .unwrap()
        .sequence(vec![text(200, "R1").into(), text(200, "R2").into()])
        .unwrap();

    let bodies: Vec<String> = (0..4)
        .map(|_| {
            router
                .dispatch(&get("https://example.org/"))
                .unwrap()
                .into_response()
                .unwrap()
                .text()
        })
        .collect();
    assert_eq!(bodies, vec!["R1", "R2", "R2", "R2"]);
    assert_eq!(route.call_count(), 4);
}

#[test]
fn test_sequence_error_items_are_raised() {
    let router = Router::default();
    router
        .get("https://example.org/")
        .unwrap()
        .sequence(vec![SequenceItem::error(ConnectError), text(200, "ok").into()])
        .unwrap();

    let err = router.dispatch(&get("https://example.org/")).unwrap_err();
    assert!(err.raised().unwrap().downcast_ref::<ConnectError>().is_some());
    assert_eq!(status(router.dispatch(&get("https://example.org/"))), 200);
}

#[test]
fn test_sequence_error_factory_may_read_history() {
    let router = Router::default();
    let history = router.clone();
    router
        .get("https://example.org/")
        .unwrap()
        .sequence(vec![
            text(200, "first").into(),
            RaiseSpec::factory(move |_req: &Request| SeenCalls(history.calls().len())).into(),
        ])
        .unwrap();

    assert_eq!(status(router.dispatch(&get("https://example.org/"))), 200);
    let err = router.dispatch(&get("https://example.org/")).unwrap_err();
    assert_eq!(err.to_string(), "saw 1 earlier calls");

    let calls = router.calls();
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[1].seq, 1);
    assert!(calls[1].error().is_some());
}

#[test]
fn test_raise_propagates_user_error_verbatim() {
    let router = Router::default();
    let route = router.get("https://example.org/").unwrap().raise(ConnectError);

    let first = router.dispatch(&get("https://example.org/")).unwrap_err();
    let second = router.dispatch(&get("https://example.org/")).unwrap_err();
    assert_eq!(first.to_string(), "connection error");
    assert!(Arc::ptr_eq(first.raised().unwrap(), second.raised().unwrap()));
    assert!(route.calls()[0].error().is_some());
}

#[test]
fn test_raise_with_builds_fresh_errors() {
    let router = Router::default();
    router
        .get("https://example.org/")
        .unwrap()
        .raise_with(|_req: &Request| ConnectError);

    let first = router.dispatch(&get("https://example.org/")).unwrap_err();
    let second = router.dispatch(&get("https://example.org/")).unwrap_err();
    assert!(!Arc::ptr_eq(first.raised().unwrap(), second.raised().unwrap()));
}

#[test]
fn test_pass_through_route() {
    let router = Router::default();
    let route = router.get("https://example.org/").unwrap().pass_through();
    assert!(route.is_pass_through());
    assert_eq!(
        router.dispatch(&get("https://example.org/")).unwrap(),
        Outcome::PassThrough
    );
    assert_eq!(route.call_count(), 1);
}

#[test]
fn test_unset_resolver_is_configuration_error() {
    let router = Router::default();
    router.get("https://example.org/").unwrap();

    let err = router.dispatch(&get("https://example.org/")).unwrap_err();
    assert!(matches!(err, Error::UnsetResolver { ref route } if route == "route#0"));
    assert!(err.is_configuration());
    assert!(router.calls().is_empty());
}

#[test]
#[traced_test]
fn test_unmatched_request_fails_when_all_mocked_required() {
    let router = Router::default();
    router.get("https://example.org/a").unwrap().respond(200u16).unwrap();

    let err = router.dispatch(&get("https://example.org/b")).unwrap_err();
    match err {
        Error::NotMocked { method, url } => {
            assert_eq!(method, "GET");
            assert_eq!(url, "https://example.org/b");
        }
        other => panic!("unexpected error {other:?}"),
    }
    assert!(router.calls().is_empty());
    assert!(logs_contain("not mocked"));
}

#[test]
fn test_unmatched_request_passes_through_when_allowed() {
    let router = lenient();
    assert_eq!(
        router.dispatch(&get("https://example.org/")).unwrap(),
        Outcome::Unmocked
    );
    assert_eq!(router.calls().len(), 1);
}

#[test]
fn test_percent_shortcut() {
    let router = Router::default();
    let _ = router.get("https://example.org/").unwrap() % StatusCode::NO_CONTENT;
    assert_eq!(status(router.dispatch(&get("https://example.org/"))), 204);
}

#[test]
fn test_route_from_lookups() {
    let router = Router::default();
    let lookups = json!({"method": "POST", "path__startswith": "/api", "json__id": 3});
    router
        .route_lookups(lookups.as_object().unwrap())
        .unwrap()
        .respond(json!({"status_code": 201}))
        .unwrap();

    let request = Request::post("https://example.org/api/items")
        .unwrap()
        .json(&json!({"id": 3}));
    assert_eq!(status(router.dispatch(&request)), 201);
}

// ===== Base url =====

#[test]
fn test_base_url_scopes_relative_routes() {
    let router =
        Router::new(RouterSettings::default().base_url("https://example.org/api/")).unwrap();
    router.get("/baz/").unwrap().respond(200u16).unwrap();

    assert_eq!(status(router.dispatch(&get("https://example.org/api/baz/"))), 200);
    for url in [
        "https://example.org/baz/",
        "https://example.com/api/baz/",
        "https://example.org/api/baz/qux",
    ] {
        assert!(matches!(
            router.dispatch(&get(url)),
            Err(Error::NotMocked { .. })
        ));
    }
}

#[test]
fn test_base_url_with_suffix_route() {
    let router =
        Router::new(RouterSettings::default().base_url("https://example.org/api/")).unwrap();
    router
        .route(Expr::pattern(Field::Path, Lookup::EndsWith, ".json").unwrap())
        .unwrap()
        .respond(200u16)
        .unwrap();

    assert_eq!(status(router.dispatch(&get("https://example.org/api/data.json"))), 200);
    assert!(matches!(
        router.dispatch(&get("https://example.org/data.json")),
        Err(Error::NotMocked { .. })
    ));
}

#[test]
fn test_invalid_base_url() {
    let err = Router::new(RouterSettings::default().base_url("not a url")).unwrap_err();
    assert!(err.is_configuration());
}

// ===== Registry =====

#[test]
fn test_duplicate_route_name() {
    let router = Router::default();
    router.route_named("users", Expr::path("/users").unwrap()).unwrap();
    let err = router
        .route_named("users", Expr::path("/other").unwrap())
        .unwrap_err();
    assert!(matches!(err, Error::DuplicateRouteName(ref name) if name == "users"));
    assert!(err.is_configuration());
    assert_eq!(router.routes().len(), 1);
}

#[test]
fn test_named_access_and_removal() {
    let router = Router::default();
    let users = router.route_named("users", Expr::path("/users").unwrap()).unwrap();

    assert_eq!(router.named("users"), Some(users.clone()));
    assert_eq!(router.get_route("users").unwrap(), users);
    assert!(matches!(router.get_route("teams"), Err(Error::RouteNotFound(_))));

    assert_eq!(router.remove("users").unwrap(), users);
    assert!(router.named("users").is_none());
    assert!(router.remove("users").is_err());
}

#[test]
fn test_load_routes() {
    let router = Router::default();
    let configs = RouteConfig::from_yaml(
        r#"
- name: user
  lookups:
    method: GET
    path__regex: ^/users/(?P<id>\d+)$
  response:
    statusCode: 200
    json: {"id": 1}
- lookups:
    host: upstream.internal
  passThrough: true
  optional: true
"#,
    )
    .unwrap();

    let routes = router.load_routes(&configs).unwrap();
    assert_eq!(routes.len(), 2);
    assert!(routes[1].is_pass_through());
    assert!(routes[1].is_optional());

    let outcome = router.dispatch(&get("https://example.org/users/9")).unwrap();
    assert_eq!(outcome.response().unwrap().json(), Some(json!({"id": 1})));
    assert_eq!(
        router.dispatch(&get("http://upstream.internal/x")).unwrap(),
        Outcome::PassThrough
    );
}

#[test]
fn test_child_router_is_independent() {
    let parent = Router::new(RouterSettings::default().assert_all_mocked(false)).unwrap();
    parent.get("https://example.org/").unwrap().respond(200u16).unwrap();

    let child = parent.child();
    assert!(!child.settings().assert_all_mocked);
    assert!(child.routes().is_empty());
    assert_eq!(
        child.dispatch(&get("https://example.org/")).unwrap(),
        Outcome::Unmocked
    );
    assert!(parent.calls().is_empty());
}

// ===== Call history =====

#[test]
fn test_reset_clears_history_keeps_routes() {
    let router = Router::default();
    let route = router.get("https://example.org/").unwrap().respond(200u16).unwrap();
    router.dispatch(&get("https://example.org/")).unwrap();
    router.dispatch(&get("https://example.org/")).unwrap();
    assert_eq!(route.call_count(), 2);

    router.reset();
    assert_eq!(router.calls().len(), 0);
    assert_eq!(route.call_count(), 0);
    assert_eq!(router.routes().len(), 1);
}

#[test]
fn test_route_reset_clears_only_that_route() {
    let router = Router::default();
    let a = router.get("https://example.org/a").unwrap().respond(200u16).unwrap();
    let b = router.get("https://example.org/b").unwrap().respond(200u16).unwrap();
    router.dispatch(&get("https://example.org/a")).unwrap();
    router.dispatch(&get("https://example.org/b")).unwrap();

    a.reset();
    assert!(!a.called());
    assert!(b.calls().assert_called_once().is_ok());
    assert_eq!(router.calls().len(), 1);
}

// ===== Activation scopes =====

#[test]
fn test_activation_rolls_back_resolver() {
    let router = Router::default();
    let route = router.get("https://example.org/").unwrap().respond(200u16).unwrap();

    let activation = router.activate();
    route.respond(500u16).unwrap();
    assert_eq!(status(router.dispatch(&get("https://example.org/"))), 500);
    activation.finish().unwrap();

    assert_eq!(status(router.dispatch(&get("https://example.org/"))), 200);
    router.reset();

    let activation = router.activate();
    assert_eq!(status(router.dispatch(&get("https://example.org/"))), 200);
    activation.finish().unwrap();
}

#[test]
fn test_activation_rolls_back_sequence_cursor() {
    let router = Router::default();
    router
        .get("https://example.org/")
        .unwrap()
        .sequence(vec![text(200, "a").into(), text(200, "b").into(), text(200, "c").into()])
        .unwrap();
    let body = |router: &Router| {
        router
            .dispatch(&get("https://example.org/"))
            .unwrap()
            .into_response()
            .unwrap()
            .text()
    };

    assert_eq!(body(&router), "a");
    let activation = router.activate();
    assert_eq!(body(&router), "b");
    assert_eq!(body(&router), "c");
    activation.finish().unwrap();

    assert_eq!(body(&router), "b");
}

#[test]
fn test_deactivation_clears_history() {
    let router = Router::default();
    let route = router.get("https://example.org/").unwrap().respond(200u16).unwrap();

    let activation = router.activate();
    router.dispatch(&get("https://example.org/")).unwrap();
    assert!(route.called());
    activation.finish().unwrap();

    assert!(!route.called());
    assert!(router.calls().is_empty());
}

#[test]
fn test_assert_all_called_fails_listing_uncalled_routes() {
    let router = Router::default();
    let users = router
        .route_named("users", Expr::path("/users").unwrap())
        .unwrap()
        .respond(200u16)
        .unwrap();
    router.get("https://example.org/teams").unwrap().respond(200u16).unwrap();

    let activation = router.activate();
    users.respond(503u16).unwrap();
    router.dispatch(&get("https://example.org/users")).unwrap();
    let err = activation.finish().unwrap_err();

    assert!(matches!(err, Error::NotAllCalled { ref routes } if routes == &["route#1"]));
    assert_eq!(err.to_string(), "Some routes were not called: route#1");
    // rollback and history reset still happened
    assert!(matches!(&*users.resolver(), crate::resolver::Resolver::Static(r) if r.status_code() == 200));
    assert!(router.calls().is_empty());
}

#[test]
fn test_assert_all_called_passes_when_every_route_called() {
    let router = Router::default();
    router.get("https://example.org/").unwrap().respond(200u16).unwrap();
    router
        .get("https://example.org/optional")
        .unwrap()
        .respond(200u16)
        .unwrap()
        .optional(true);

    let activation = router.activate();
    router.dispatch(&get("https://example.org/")).unwrap();
    assert!(activation.finish().is_ok());
}

#[test]
fn test_overrides_apply_only_inside_scope() {
    let router = Router::default();
    router.get("https://example.org/").unwrap().respond(200u16).unwrap();

    let activation = router
        .activate_with(
            &ScopeOverrides::new()
                .assert_all_called(false)
                .assert_all_mocked(false),
        )
        .unwrap();
    assert_eq!(
        router.dispatch(&get("https://example.org/missing")).unwrap(),
        Outcome::Unmocked
    );
    assert!(activation.finish().is_ok());

    assert!(router.settings().assert_all_called);
    assert!(router.settings().assert_all_mocked);
}

#[test]
fn test_invalid_override_does_not_activate() {
    let router = Router::default();
    assert!(router
        .activate_with(&ScopeOverrides::new().base_url("relative/path"))
        .is_err());
    assert!(!router.is_active());
}

#[test]
fn test_routes_added_in_scope_persist() {
    let router = Router::default();
    let activation = router.activate();
    let route = router.get("https://example.org/").unwrap().respond(201u16).unwrap();
    router.dispatch(&get("https://example.org/")).unwrap();
    activation.finish().unwrap();

    assert_eq!(router.routes(), vec![route]);
    assert_eq!(status(router.dispatch(&get("https://example.org/"))), 201);
}

#[test]
fn test_nested_activations_restore_each_level() {
    let router = Router::new(RouterSettings::default().assert_all_called(false)).unwrap();
    let route = router.get("https://example.org/").unwrap().respond(200u16).unwrap();

    let outer = router.activate();
    route.respond(201u16).unwrap();
    let inner = router.activate();
    route.respond(202u16).unwrap();
    assert_eq!(status(router.dispatch(&get("https://example.org/"))), 202);

    inner.finish().unwrap();
    assert!(router.is_active());
    assert_eq!(status(router.dispatch(&get("https://example.org/"))), 201);

    outer.finish().unwrap();
    assert!(!router.is_active());
    assert_eq!(status(router.dispatch(&get("https://example.org/"))), 200);
}

#[test]
fn test_scope_reports_body_and_teardown_errors() {
    let router = Router::default();
    router.get("https://example.org/").unwrap().respond(200u16).unwrap();

    let result: std::result::Result<(), ScopeError<Error>> =
        router.scope(|_router| Err(Error::InvalidRequest("body failed".into())));
    match result {
        Err(ScopeError::Body { source, teardown }) => {
            assert!(matches!(source, Error::InvalidRequest(_)));
            assert!(matches!(teardown, Some(Error::NotAllCalled { .. })));
        }
        other => panic!("unexpected result {other:?}"),
    }

    let result = router.scope(|_router| Ok::<_, Error>(7));
    assert!(matches!(result, Err(ScopeError::Teardown(Error::NotAllCalled { .. }))));

    let value = router
        .scope(|router| {
            router.dispatch(&get("https://example.org/"))?;
            Ok::<_, Error>(7)
        })
        .unwrap();
    assert_eq!(value, 7);
}

#[test]
#[traced_test]
fn test_activation_is_logged() {
    let router = Router::new(RouterSettings::default().assert_all_called(false)).unwrap();
    router.activate().finish().unwrap();
    assert!(logs_contain("Router activated (depth 1)"));
    assert!(logs_contain("Router deactivated"));
}

#[test]
#[should_panic(expected = "Some routes were not called")]
fn test_dropped_activation_panics_on_teardown_failure() {
    let router = Router::default();
    router.get("https://example.org/").unwrap().respond(200u16).unwrap();
    let _activation = router.activate();
}

// ===== Concurrency and async =====

#[test]
fn test_concurrent_sequence_dispatch_hands_out_each_item_once() {
    let router = Router::default();
    let items: Vec<SequenceItem> = (0..64).map(|i| text(200, &i.to_string()).into()).collect();
    router.route(Expr::any()).unwrap().sequence(items).unwrap();

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let router = router.clone();
            thread::spawn(move || {
                (0..8)
                    .map(|_| {
                        router
                            .dispatch(&get("https://example.org/"))
                            .unwrap()
                            .into_response()
                            .unwrap()
                            .text()
                    })
                    .collect::<Vec<_>>()
            })
        })
        .collect();

    let mut bodies: Vec<usize> = handles
        .into_iter()
        .flat_map(|handle| handle.join().unwrap())
        .map(|body| body.parse().unwrap())
        .collect();
    bodies.sort_unstable();
    assert_eq!(bodies, (0..64).collect::<Vec<_>>());

    // history order is item order
    let calls = router.calls();
    for (index, call) in calls.iter().enumerate() {
        assert_eq!(call.seq as usize, index);
        assert_eq!(call.response().unwrap().text(), index.to_string());
    }
}

#[tokio::test]
async fn test_async_side_effect() {
    let router = Router::default();
    router
        .url_route("https://example.org/slow")
        .side_effect_async(|_req: Request, _caps: Captures| async {
            tokio::time::sleep(Duration::from_millis(5)).await;
            text(200, "late")
        });

    let outcome = router
        .dispatch_async(&get("https://example.org/slow"))
        .await
        .unwrap();
    assert_eq!(outcome.response().unwrap().text(), "late");
    assert_eq!(router.calls().len(), 1);
}

#[tokio::test]
async fn test_cancelled_dispatch_records_nothing() {
    let router = Router::default();
    let route = router
        .url_route("https://example.org/hang")
        .side_effect_async(|_req: Request, _caps: Captures| async {
            futures::future::pending::<()>().await;
            text(200, "never")
        });

    let request = get("https://example.org/hang");
    let result = tokio::time::timeout(Duration::from_millis(20), router.dispatch_async(&request)).await;
    assert!(result.is_err());
    assert!(router.calls().is_empty());
    assert_eq!(route.call_count(), 0);
}

#[test]
fn test_blocking_dispatch_drives_async_side_effect() {
    let router = Router::default();
    router
        .url_route("https://example.org/")
        .side_effect_async(|req: Request, _caps: Captures| async move {
            text(200, req.path())
        });

    let outcome = router.dispatch(&get("https://example.org/")).unwrap();
    assert_eq!(outcome.response().unwrap().text(), "/");
}

#[test]
fn test_static_response_from_template() {
    let router = Router::default();
    let template = ResponseTemplate::new(200)
        .header("X-Source", "decoy")
        .json(json!({"ok": true}));
    router.get("https://example.org/").unwrap().respond(&template).unwrap();

    let first = router.dispatch(&get("https://example.org/")).unwrap();
    let second = router.dispatch(&get("https://example.org/")).unwrap();
    assert_eq!(first, second);
    assert_eq!(first.response().unwrap().headers.get("x-source").unwrap(), "decoy");
}

impl Router {
    /// Test helper: unnamed route for an absolute url.
    fn url_route(&self, url: &str) -> Route {
        self.route(Expr::url(url).unwrap()).unwrap()
    }
}

mod common;

use brrtmapper::{
    run_chain, AllowedMethodsOptions, Context, HttpError, Mapper, MapperOptions, Request,
    RouteOptions,
};
use common::{quiet_mapper, respond, send};
use http::{Method, StatusCode};
use serde_json::json;

fn users() -> Mapper {
    let mapper = quiet_mapper();
    mapper.get("/users", RouteOptions::new(), respond(json!([]))).unwrap();
    mapper.put("/users", RouteOptions::new(), respond(json!("saved"))).unwrap();
    mapper
}

fn run_with(mapper: &Mapper, options: AllowedMethodsOptions, request: Request) -> (Context, Result<(), HttpError>) {
    let mut ctx = Context::new(request);
    let chain = [mapper.allowed_methods(options), mapper.routes()];
    let result = run_chain(&chain, &mut ctx);
    (ctx, result)
}

#[test]
fn test_method_not_allowed_lists_allowed_methods() {
    let ctx = send(&users(), Request::new(Method::DELETE, "/users"));
    assert_eq!(ctx.response.status(), StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(ctx.response.header("allow"), Some("HEAD, GET, PUT"));
}

#[test]
fn test_options_answers_with_allow() {
    let ctx = send(&users(), Request::new(Method::OPTIONS, "/users"));
    assert_eq!(ctx.response.status(), StatusCode::OK);
    assert_eq!(ctx.response.header("allow"), Some("HEAD, GET, PUT"));
    assert_eq!(ctx.response.body, Some(json!("")));
}

#[test]
fn test_head_is_served_by_get_routes() {
    let ctx = send(&users(), Request::new(Method::HEAD, "/users"));
    assert_eq!(ctx.response.status(), StatusCode::OK);
}

#[test]
fn test_unimplemented_method() {
    let ctx = send(&users(), Request::new(Method::TRACE, "/users"));
    assert_eq!(ctx.response.status(), StatusCode::NOT_IMPLEMENTED);

    let mapper = Mapper::with_options(MapperOptions {
        methods: vec![Method::GET, Method::HEAD],
        ..MapperOptions::without_openapi()
    })
    .unwrap();
    mapper.get("/users", RouteOptions::new(), respond(json!([]))).unwrap();
    let ctx = send(&mapper, Request::new(Method::POST, "/users"));
    assert_eq!(ctx.response.status(), StatusCode::NOT_IMPLEMENTED);
}

#[test]
fn test_unmatched_paths_stay_not_found() {
    let ctx = send(&users(), Request::new(Method::DELETE, "/teams"));
    assert_eq!(ctx.response.status(), StatusCode::NOT_FOUND);
    assert_eq!(ctx.response.header("allow"), None);
}

#[test]
fn test_answered_requests_are_untouched() {
    let ctx = send(&users(), Request::new(Method::PUT, "/users"));
    assert_eq!(ctx.response.status(), StatusCode::OK);
    assert_eq!(ctx.response.body, Some(json!("saved")));
    assert_eq!(ctx.response.header("allow"), None);
}

#[test]
fn test_throw_mode_returns_errors() {
    let mapper = users();
    let (_, result) = run_with(
        &mapper,
        AllowedMethodsOptions::default().throw(),
        Request::new(Method::DELETE, "/users"),
    );
    let err = result.unwrap_err();
    assert_eq!(err.status, StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(
        err.headers.get("allow").and_then(|v| v.to_str().ok()),
        Some("HEAD, GET, PUT")
    );

    let (_, result) = run_with(
        &mapper,
        AllowedMethodsOptions::default().throw(),
        Request::new(Method::TRACE, "/users"),
    );
    assert_eq!(result.unwrap_err().status, StatusCode::NOT_IMPLEMENTED);
}

#[test]
fn test_throw_mode_uses_factories() {
    let mapper = users();
    let options = AllowedMethodsOptions::default()
        .throw()
        .method_not_allowed(|| {
            HttpError::new(StatusCode::METHOD_NOT_ALLOWED, "custom not allowed")
                .with_body(json!({"error": "nope"}))
        })
        .not_implemented(|| HttpError::new(StatusCode::NOT_IMPLEMENTED, "custom not implemented"));

    let (mut ctx, result) = run_with(&mapper, options.clone(), Request::new(Method::DELETE, "/users"));
    ctx.finish(result);
    assert_eq!(ctx.response.status(), StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(ctx.response.body, Some(json!({"error": "nope"})));

    let (_, result) = run_with(&mapper, options, Request::new(Method::TRACE, "/users"));
    assert_eq!(result.unwrap_err().message, "custom not implemented");
}

#[test]
fn test_factories_are_ignored_without_throw() {
    let mapper = users();
    let options = AllowedMethodsOptions::default()
        .method_not_allowed(|| HttpError::new(StatusCode::IM_A_TEAPOT, "unused"));
    let (ctx, result) = run_with(&mapper, options, Request::new(Method::DELETE, "/users"));
    assert!(result.is_ok());
    assert_eq!(ctx.response.status(), StatusCode::METHOD_NOT_ALLOWED);
}

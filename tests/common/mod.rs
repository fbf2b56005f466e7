#![allow(dead_code)]

use brrtmapper::{stage, Context, Mapper, MapperOptions, Next, Request, Stage};
use http::Method;
use serde_json::{json, Value};

/// Mapper without the document endpoint, so it does not show up in matches
pub fn quiet_mapper() -> Mapper {
    Mapper::with_options(MapperOptions::without_openapi()).unwrap()
}

/// Stage answering with `body`
pub fn respond(body: Value) -> Vec<Stage> {
    vec![stage(move |ctx: &mut Context, _next: Next<'_>| {
        ctx.set_body(body.clone());
        Ok(())
    })]
}

/// Stage answering with the extracted params
pub fn echo_params() -> Vec<Stage> {
    vec![stage(|ctx: &mut Context, _next: Next<'_>| {
        let params = Value::Object(ctx.params.clone());
        ctx.set_body(params);
        Ok(())
    })]
}

/// Stage answering with the decoded (and coerced) body
pub fn echo_body() -> Vec<Stage> {
    vec![stage(|ctx: &mut Context, _next: Next<'_>| {
        let body = ctx.request.body.clone().unwrap_or(Value::Null);
        ctx.set_body(body);
        Ok(())
    })]
}

/// Stage appending `label` to `ctx.state["log"]` and continuing
pub fn trace(label: &'static str) -> Stage {
    stage(move |ctx: &mut Context, next: Next<'_>| {
        log(ctx, label);
        next.run(ctx)
    })
}

pub fn log(ctx: &mut Context, entry: &str) {
    if let Some(items) = ctx
        .state
        .entry("log")
        .or_insert_with(|| json!([]))
        .as_array_mut()
    {
        items.push(json!(entry));
    }
}

/// Run `mapper` (with default allowed-methods handling) and finish the response
pub fn send(mapper: &Mapper, request: Request) -> Context {
    let mut ctx = Context::new(request);
    let result = mapper.handle(&mut ctx);
    ctx.finish(result);
    ctx
}

pub fn get(mapper: &Mapper, target: &str) -> Context {
    send(mapper, Request::new(Method::GET, target))
}

use crate::{
    checker::{Op, SuccessRate},
    scenario::RunState,
};
use actix_web::{web, HttpResponse, Responder};
use serde::Serialize;

#[derive(Serialize)]
struct RootApiResponse {
    title: &'static str,
    version: &'static str,
    running: bool,
    phases_finished: usize,
}

#[actix_web::get("/")]
async fn index(state: web::Data<RunState>) -> impl Responder {
    HttpResponse::Ok().json(RootApiResponse {
        title: "vecchaos",
        version: env!("CARGO_PKG_VERSION"),
        running: state.phase.read().await.is_some(),
        phases_finished: state.finished.read().await.len(),
    })
}

#[derive(Serialize)]
struct CheckerStatus {
    op: Op,
    succ: u64,
    fail: u64,
    total: u64,
    succ_rate: f64,
}

#[derive(Serialize)]
struct CheckersResponse {
    phase: Option<String>,
    checkers: Vec<CheckerStatus>,
}

/// Live counters of the current phase.
#[actix_web::get("/checkers")]
async fn get_checkers(state: web::Data<RunState>) -> impl Responder {
    let phase = state.phase.read().await.clone();
    let checkers = state
        .counters
        .read()
        .await
        .iter()
        .map(|(op, counters)| CheckerStatus {
            op: *op,
            succ: counters.succ(),
            fail: counters.fail(),
            total: counters.total(),
            succ_rate: counters.succ_rate(),
        })
        .collect();

    HttpResponse::Ok().json(CheckersResponse { phase, checkers })
}

/// Outcomes of the phases finished so far.
#[actix_web::get("/phases")]
async fn get_phases(state: web::Data<RunState>) -> impl Responder {
    let finished = state.finished.read().await;
    HttpResponse::Ok().json(&*finished)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checker::Counters;
    use actix_web::{test, App};
    use serde_json::Value;
    use std::{collections::BTreeMap, sync::Arc, time::Duration};

    #[actix_web::test]
    async fn test_checkers_endpoint_reports_counters() {
        let state = Arc::new(RunState::default());
        let counters = Arc::new(Counters::default());
        counters.record(true, Duration::from_millis(1));
        counters.record(false, Duration::from_millis(1));
        *state.counters.write().await = BTreeMap::from_iter([(Op::Search, counters)]);
        *state.phase.write().await = Some("during-chaos".to_string());

        let app = test::init_service(
            App::new()
                .service(get_checkers)
                .app_data(web::Data::from(state)),
        )
        .await;

        let req = test::TestRequest::get().uri("/checkers").to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;

        assert_eq!(body["phase"], "during-chaos");
        assert_eq!(body["checkers"][0]["op"], "search");
        assert_eq!(body["checkers"][0]["total"], 2);
        assert_eq!(body["checkers"][0]["succ_rate"], 0.5);
    }

    #[actix_web::test]
    async fn test_index_and_empty_phases() {
        let state = Arc::new(RunState::default());
        let app = test::init_service(
            App::new()
                .service(index)
                .service(get_phases)
                .app_data(web::Data::from(state)),
        )
        .await;

        let req = test::TestRequest::get().uri("/").to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["title"], "vecchaos");
        assert_eq!(body["running"], false);
        assert_eq!(body["phases_finished"], 0);

        let req = test::TestRequest::get().uri("/phases").to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body, serde_json::json!([]));
    }
}

use crate::server::SharedState;
use axum::{extract::State, response::Json};
use serde::Serialize;
use tomato_diagnosis::DiseaseLabel;

#[derive(Serialize)]
pub struct LabelInfo {
    index: usize,
    class_name: &'static str,
    name: &'static str,
    treatment: &'static str,
}

pub async fn list_labels(State(state): State<SharedState>) -> Json<Vec<LabelInfo>> {
    state.metrics.record_request("/labels");

    Json(
        DiseaseLabel::ALL
            .iter()
            .map(|label| LabelInfo {
                index: label.index(),
                class_name: label.class_name(),
                name: label.display_name(),
                treatment: label.treatment(),
            })
            .collect(),
    )
}

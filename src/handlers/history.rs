use axum::{
    extract::{Path, State},
    response::Json,
};
use log::debug;

use crate::error::AppError;
use crate::models::{Field, SeriesMap, WideRecord};
use crate::service::PriceHistory;

async fn series(history: &PriceHistory, id: u64, field: Field) -> Result<Json<SeriesMap>, AppError> {
    debug!("Processing {} request for {}", field, id);
    history.series(id, field).await.map(Json)
}

pub async fn price_handler(
    State(history): State<PriceHistory>,
    Path(id): Path<u64>,
) -> Result<Json<SeriesMap>, AppError> {
    series(&history, id, Field::Price).await
}

pub async fn discount_handler(
    State(history): State<PriceHistory>,
    Path(id): Path<u64>,
) -> Result<Json<SeriesMap>, AppError> {
    series(&history, id, Field::Discount).await
}

pub async fn price_old_handler(
    State(history): State<PriceHistory>,
    Path(id): Path<u64>,
) -> Result<Json<SeriesMap>, AppError> {
    series(&history, id, Field::OldPrice).await
}

pub async fn records_handler(
    State(history): State<PriceHistory>,
    Path(id): Path<u64>,
) -> Result<Json<Vec<WideRecord>>, AppError> {
    debug!("Processing records request for {}", id);
    history.records(id).await.map(Json)
}

//! Represents a tracked user's last known position and category.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use thiserror::Error;

/// One row of the `users` table.
///
/// Created on the first upsert for an `id` and updated in place afterwards.
/// The service never deletes rows.
#[derive(Serialize, Deserialize, Clone, FromRow, Debug, PartialEq)]
pub struct UserLocation {
    /// Opaque identifier, primary key of the table.
    pub id: String,

    pub latitude: f64,

    pub longitude: f64,

    /// Integer category code, exposed as `type` on the wire and in the table.
    #[serde(rename = "type")]
    #[sqlx(rename = "type")]
    pub kind: i32,
}

/// Body of `POST /user`.
///
/// Clients send every field as a JSON string, including the numeric ones;
/// [`UpsertUserRequest::into_location`] parses them before anything is stored.
#[derive(Debug, Deserialize)]
pub struct UpsertUserRequest {
    pub id: String,
    pub latitude: String,
    pub longitude: String,
    #[serde(rename = "type")]
    pub kind: String,
}

#[derive(Debug, Error, PartialEq)]
#[error("field `{field}` has invalid value `{value}`: {reason}")]
pub struct InvalidUserField {
    pub field: &'static str,
    pub value: String,
    pub reason: String,
}

impl UpsertUserRequest {
    /// Parse the string-typed wire fields into a storable [`UserLocation`].
    pub fn into_location(self) -> Result<UserLocation, InvalidUserField> {
        let latitude = parse_coordinate("latitude", &self.latitude)?;
        let longitude = parse_coordinate("longitude", &self.longitude)?;
        let kind = parse_field("type", &self.kind)?;

        Ok(UserLocation {
            id: self.id,
            latitude,
            longitude,
            kind,
        })
    }
}

/// Like [`parse_field`], but `NaN` and infinities are refused: neither can be
/// stored in a `REAL NOT NULL` column nor represented in JSON.
fn parse_coordinate(field: &'static str, raw: &str) -> Result<f64, InvalidUserField> {
    let value: f64 = parse_field(field, raw)?;
    if !value.is_finite() {
        return Err(InvalidUserField {
            field,
            value: raw.to_string(),
            reason: "coordinate must be a finite number".into(),
        });
    }
    Ok(value)
}

fn parse_field<T>(field: &'static str, raw: &str) -> Result<T, InvalidUserField>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim().parse::<T>().map_err(|err| InvalidUserField {
        field,
        value: raw.to_string(),
        reason: err.to_string(),
    })
}

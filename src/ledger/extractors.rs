use std::collections::HashMap;
use std::convert::Infallible;

use axum::{
    async_trait,
    extract::{FromRequestParts, Path},
    http::{request::Parts, StatusCode},
};

use super::repo_types::{EntryId, MealSlot};
use crate::day_key::DayKey;
use crate::tracker::Clock;

type Rejection = (StatusCode, String);

async fn path_params<S: Send + Sync>(
    parts: &mut Parts,
    state: &S,
) -> Result<HashMap<String, String>, Rejection> {
    let Path(params) = Path::<HashMap<String, String>>::from_request_parts(parts, state)
        .await
        .map_err(|e| (StatusCode::BAD_REQUEST, e.body_text()))?;
    Ok(params)
}

fn param<'a>(params: &'a HashMap<String, String>, name: &str) -> Result<&'a str, Rejection> {
    params
        .get(name)
        .map(String::as_str)
        .ok_or((StatusCode::BAD_REQUEST, format!("missing path parameter `{name}`")))
}

/// The request's single reading of the system clock, shared by every
/// extractor of that request.
fn request_clock(parts: &mut Parts) -> Clock {
    if let Some(clock) = parts.extensions.get::<Clock>() {
        return *clock;
    }
    let clock = Clock::system();
    parts.extensions.insert(clock);
    clock
}

/// `YYYY-MM-DD`, or `today` for `clock`'s day in the reference zone.
pub fn parse_day(raw: &str, clock: &Clock) -> Result<DayKey, Rejection> {
    if raw.eq_ignore_ascii_case("today") {
        return Ok(clock.today);
    }
    DayKey::parse(raw).map_err(|e| (StatusCode::BAD_REQUEST, e.to_string()))
}

fn parse_slot(raw: &str) -> Result<MealSlot, Rejection> {
    raw.parse::<MealSlot>()
        .map_err(|e| (StatusCode::BAD_REQUEST, e.to_string()))
}

/// `:day` path segment.
pub struct DayPath(pub DayKey);

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for DayPath {
    type Rejection = Rejection;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let params = path_params(parts, state).await?;
        let clock = request_clock(parts);
        Ok(DayPath(parse_day(param(&params, "day")?, &clock)?))
    }
}

/// `:day/meals/:slot` path segments.
pub struct SlotPath {
    pub day: DayKey,
    pub slot: MealSlot,
}

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for SlotPath {
    type Rejection = Rejection;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let params = path_params(parts, state).await?;
        let clock = request_clock(parts);
        Ok(SlotPath {
            day: parse_day(param(&params, "day")?, &clock)?,
            slot: parse_slot(param(&params, "slot")?)?,
        })
    }
}

/// `:day/meals/:slot/entries/:id` path segments.
pub struct EntryPath {
    pub day: DayKey,
    pub slot: MealSlot,
    pub id: EntryId,
}

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for EntryPath {
    type Rejection = Rejection;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let params = path_params(parts, state).await?;
        let clock = request_clock(parts);
        Ok(EntryPath {
            day: parse_day(param(&params, "day")?, &clock)?,
            slot: parse_slot(param(&params, "slot")?)?,
            id: param(&params, "id")?.to_string(),
        })
    }
}

/// The clock reading `today` path segments were resolved against.
pub struct RequestClock(pub Clock);

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for RequestClock {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(RequestClock(request_clock(parts)))
    }
}

#[cfg(test)]
mod tests {
    use axum::http::Request;
    use time::macros::datetime;

    use super::*;

    #[tokio::test]
    async fn today_and_request_clock_share_one_reading() {
        let pinned = Clock::at(datetime!(2024-06-09 18:29:59.999 UTC));
        let (mut parts, _) = Request::builder()
            .uri("/days/today")
            .body(())
            .unwrap()
            .into_parts();
        parts.extensions.insert(pinned);

        let RequestClock(clock) = RequestClock::from_request_parts(&mut parts, &())
            .await
            .unwrap();
        assert_eq!(clock, pinned);
        assert_eq!(parse_day("Today", &clock).unwrap().to_string(), "2024-06-09");
    }

    #[test]
    fn explicit_days_ignore_the_clock() {
        let clock = Clock::at(datetime!(2024-06-09 20:00 UTC));
        assert_eq!(
            parse_day("2023-02-28", &clock).unwrap().to_string(),
            "2023-02-28"
        );
        assert_eq!(
            parse_day("2023-02-30", &clock).unwrap_err().0,
            StatusCode::BAD_REQUEST
        );
    }
}

// Copyright: Kyler Chin <kyler@catenarymaps.org>
// Catenary Transit Initiatives
// Removal of the attribution is not allowed, as covered under the AGPL license

use crate::Coordinate;
use crate::directions::DirectionsResponse;
use crate::polyline_codec::decode_polyline;
use log::warn;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RouteError {
    /// Provider reported no usable route (non-OK status, or zero
    /// routes/legs/steps). Surfaced to the caller as "could not plan a
    /// route"; no partial route is built.
    #[error("directions response contains no usable route")]
    EmptyRoute,
}

/// One maneuver-terminated slice of the route. Immutable once built; a
/// re-route replaces the whole step list instead of editing steps in place.
#[derive(Clone, Debug, PartialEq)]
pub struct RouteStep {
    /// Provider maneuver label. `None` means the provider sent none; the
    /// maneuver encoder applies the default at command time.
    pub maneuver: Option<String>,
    /// Decoded step geometry. Empty when the encoded polyline failed to
    /// decode; off-route scoring is skipped for such a step.
    pub path: Vec<Coordinate>,
    /// Encoded form, retained for transmission and debug dumps.
    pub encoded_polyline: String,
    pub step_index: usize,
    /// The turn point this step runs up to.
    pub end_location: Coordinate,
}

/// Ordered route steps plus the cursor of the step being driven.
///
/// The cursor only ever moves forward within one route instance; `replace`
/// swaps in a whole new step list and resets it to 0. cursor == len means the
/// route is complete.
#[derive(Clone, Debug)]
pub struct NavRoute {
    steps: Vec<RouteStep>,
    current_step_index: usize,
}

impl NavRoute {
    /// Builds a route from the first leg of the provider's first route.
    pub fn from_response(response: &DirectionsResponse) -> Result<Self, RouteError> {
        if response.status != "OK" {
            return Err(RouteError::EmptyRoute);
        }

        let leg_steps = response
            .routes
            .first()
            .and_then(|route| route.legs.first())
            .map(|leg| &leg.steps)
            .filter(|steps| !steps.is_empty())
            .ok_or(RouteError::EmptyRoute)?;

        let steps = leg_steps
            .iter()
            .enumerate()
            .map(|(step_index, step)| {
                let path = match decode_polyline(&step.polyline.points) {
                    Ok(path) => path,
                    Err(err) => {
                        warn!("step {step_index}: undecodable polyline, storing empty geometry: {err}");
                        Vec::new()
                    }
                };

                RouteStep {
                    maneuver: step.maneuver.clone(),
                    path,
                    encoded_polyline: step.polyline.points.clone(),
                    step_index,
                    end_location: step.end_location,
                }
            })
            .collect();

        Ok(Self {
            steps,
            current_step_index: 0,
        })
    }

    /// Moves the cursor forward one step; no-op once the route is complete.
    pub fn advance(&mut self) {
        if self.current_step_index < self.steps.len() {
            self.current_step_index += 1;
        }
    }

    /// `None` exactly when the route is complete.
    pub fn current_step(&self) -> Option<&RouteStep> {
        self.steps.get(self.current_step_index)
    }

    /// The step after the cursor, saturating at the final step. On the last
    /// leg "the next step" is the last step itself, which is expected rather
    /// than an error.
    pub fn next_step(&self) -> Option<&RouteStep> {
        if self.steps.is_empty() {
            return None;
        }
        let index = (self.current_step_index + 1).min(self.steps.len() - 1);
        self.steps.get(index)
    }

    /// Discard-and-rebuild from a fresh provider response, resetting the
    /// cursor. On failure the existing route is left untouched.
    pub fn replace_from_response(&mut self, response: &DirectionsResponse) -> Result<(), RouteError> {
        let replacement = Self::from_response(response)?;
        *self = replacement;
        Ok(())
    }

    pub fn is_complete(&self) -> bool {
        self.current_step_index >= self.steps.len()
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn current_index(&self) -> usize {
        self.current_step_index
    }

    pub fn steps(&self) -> &[RouteStep] {
        &self.steps
    }
}

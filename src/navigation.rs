// Copyright: Kyler Chin <kyler@catenarymaps.org>
// Catenary Transit Initiatives
// Removal of the attribution is not allowed, as covered under the AGPL license

use crate::Coordinate;
use crate::directions::{DirectionsProvider, Origin};
use crate::geometry;
use crate::location::LocationProvider;
use crate::maneuver::{self, COMPLETE_MANEUVER, DEFAULT_MANEUVER};
use crate::route::NavRoute;
use crate::transport::CommandTransport;
use log::{debug, info, warn};
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;

/// Session tuning knobs. Thresholds are policy, not correctness: larger
/// values trade early/late triggering for GPS-noise tolerance.
#[derive(Clone, Debug)]
pub struct NavConfig {
    /// Distance from the current step's path beyond which a re-route is
    /// requested.
    pub off_route_threshold_m: f64,
    /// Distance to the current step's turn point below which the maneuver
    /// command is sent and the cursor advances.
    pub advance_threshold_m: f64,
    /// Decision cycle period.
    pub tick_interval: Duration,
    /// Travel mode forwarded to the directions provider on re-routes.
    pub travel_mode: String,
}

impl Default for NavConfig {
    fn default() -> Self {
        Self {
            off_route_threshold_m: 25.0,
            advance_threshold_m: 15.0,
            tick_interval: Duration::from_millis(500),
            travel_mode: "driving".to_string(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NavState {
    Idle,
    Navigating,
    Rerouting,
    Advancing,
    Completed,
    Stopped,
}

/// What a single decision cycle did.
#[derive(Clone, Debug, PartialEq)]
pub enum CycleOutcome {
    /// No position fix; nothing changed.
    Skipped,
    OnRoute { distance_to_turn_m: f64 },
    Advanced { new_step_index: usize },
    /// Off route and the provider supplied a replacement route.
    Rerouted,
    /// Off route but the provider call failed; the stale route is kept and
    /// a later cycle retries.
    RerouteFailed,
    Completed,
    Stopped,
}

/// Stops a running session. Observed within one cycle interval; safe to call
/// from another task and more than once.
pub struct SessionHandle {
    stop_tx: watch::Sender<bool>,
}

impl SessionHandle {
    pub fn stop(&self) {
        let _ = self.stop_tx.send(true);
    }
}

/// One navigation session over one route.
///
/// The session owns its [`NavRoute`] exclusively; nothing else mutates it.
/// The only suspension points are the interval tick and the awaited re-route
/// call, and at most one re-route is in flight at a time.
pub struct NavigationSession<L, D, T> {
    route: NavRoute,
    location: L,
    directions: D,
    transport: T,
    destination: String,
    config: NavConfig,
    state: NavState,
    stop_rx: watch::Receiver<bool>,
    sentinel_sent: bool,
}

impl<L, D, T> NavigationSession<L, D, T>
where
    L: LocationProvider,
    D: DirectionsProvider,
    T: CommandTransport,
{
    pub fn new(
        route: NavRoute,
        location: L,
        directions: D,
        transport: T,
        destination: String,
        config: NavConfig,
    ) -> (Self, SessionHandle) {
        let (stop_tx, stop_rx) = watch::channel(false);
        (
            Self {
                route,
                location,
                directions,
                transport,
                destination,
                config,
                state: NavState::Idle,
                stop_rx,
                sentinel_sent: false,
            },
            SessionHandle { stop_tx },
        )
    }

    pub fn state(&self) -> NavState {
        self.state
    }

    pub fn route(&self) -> &NavRoute {
        &self.route
    }

    /// Runs decision cycles on the configured interval until the route
    /// completes or the session is stopped. Returns the terminal state.
    pub async fn run(mut self) -> NavState {
        info!(
            "starting navigation: {} step(s) towards {}",
            self.route.len(),
            self.destination
        );
        self.state = NavState::Navigating;

        let mut ticker = tokio::time::interval(self.config.tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut stop_rx = self.stop_rx.clone();

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                changed = stop_rx.changed() => {
                    if changed.is_err() {
                        // every handle dropped, fall back to timer pacing
                        ticker.tick().await;
                    }
                }
            }

            match self.cycle().await {
                CycleOutcome::Completed | CycleOutcome::Stopped => break,
                _ => {}
            }
        }

        info!("navigation ended: {:?}", self.state);
        self.state
    }

    /// One decision cycle: poll position, score it against the current step,
    /// then re-route, advance, or keep going.
    pub async fn cycle(&mut self) -> CycleOutcome {
        if *self.stop_rx.borrow() {
            return self.finish(NavState::Stopped);
        }
        if self.route.is_complete() {
            return self.finish(NavState::Completed);
        }

        let Some(position) = self.location.current_position() else {
            debug!("no position fix, skipping this cycle");
            return CycleOutcome::Skipped;
        };

        self.state = NavState::Navigating;

        let (off_path_m, distance_to_turn_m, step_maneuver, step_index) = {
            let step = match self.route.current_step() {
                Some(step) => step,
                None => return self.finish(NavState::Completed),
            };
            (
                // None when the step stored no usable geometry; the
                // off-route check is skipped rather than re-routing blind
                geometry::distance_point_to_polyline(position, &step.path),
                geometry::distance_point_to_point(position, step.end_location),
                step.maneuver.clone(),
                step.step_index,
            )
        };

        if let Some(off_path_m) = off_path_m {
            if off_path_m > self.config.off_route_threshold_m {
                info!(
                    "step {step_index}: {off_path_m:.1} m off the route path, requesting a new route"
                );
                self.state = NavState::Rerouting;
                let outcome = self.reroute(position).await;
                // a stop may have arrived while the re-route was in flight
                if *self.stop_rx.borrow() {
                    return self.finish(NavState::Stopped);
                }
                self.state = NavState::Navigating;
                return outcome;
            }
        }

        if distance_to_turn_m < self.config.advance_threshold_m {
            self.state = NavState::Advancing;
            let command = maneuver::encode_command(step_maneuver.as_deref(), distance_to_turn_m);
            if let Err(err) = self.transport.send(&command) {
                // geometry decides progress, not delivery
                warn!("command for step {step_index} not delivered: {err}");
            }
            self.route.advance();
            let new_step_index = self.route.current_index();
            info!("advancing to step index {new_step_index}");
            self.state = NavState::Navigating;
            return CycleOutcome::Advanced { new_step_index };
        }

        if let Some(next) = self.route.next_step() {
            debug!(
                "on route, {distance_to_turn_m:.1} m to the turn, then {}",
                next.maneuver.as_deref().unwrap_or(DEFAULT_MANEUVER)
            );
        }

        CycleOutcome::OnRoute { distance_to_turn_m }
    }

    /// One serial re-route: current position as origin, original destination.
    /// Failure keeps the stale route; a later off-route cycle retries.
    async fn reroute(&mut self, position: Coordinate) -> CycleOutcome {
        let origin = Origin::Position(position);
        match self
            .directions
            .get_route(&origin, &self.destination, &self.config.travel_mode)
            .await
        {
            Ok(response) => match self.route.replace_from_response(&response) {
                Ok(()) => {
                    info!("route replaced, {} step(s)", self.route.len());
                    CycleOutcome::Rerouted
                }
                Err(err) => {
                    warn!("discarding unusable re-route response: {err}");
                    CycleOutcome::RerouteFailed
                }
            },
            Err(err) => {
                warn!("re-route request failed, keeping the current route: {err}");
                CycleOutcome::RerouteFailed
            }
        }
    }

    /// Enters a terminal state, emitting the completion sentinel exactly once
    /// across the session's lifetime.
    fn finish(&mut self, state: NavState) -> CycleOutcome {
        self.state = state;
        if !self.sentinel_sent {
            self.sentinel_sent = true;
            let command = maneuver::encode_command(Some(COMPLETE_MANEUVER), 0.0);
            if let Err(err) = self.transport.send(&command) {
                warn!("completion command not delivered: {err}");
            }
        }
        match state {
            NavState::Stopped => CycleOutcome::Stopped,
            _ => CycleOutcome::Completed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directions::{
        DirectionsError, DirectionsResponse, DirectionsRoute, LegStep, PolylinePoints, RouteLeg,
    };
    use crate::maneuver::ManeuverCommand;
    use crate::polyline_codec::encode_polyline;
    use crate::transport::TransportError;
    use std::sync::Arc;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FixedLocation(Option<Coordinate>);

    impl LocationProvider for FixedLocation {
        fn current_position(&self) -> Option<Coordinate> {
            self.0
        }
    }

    #[derive(Default)]
    struct RecordingTransport {
        sent: Mutex<Vec<ManeuverCommand>>,
    }

    impl RecordingTransport {
        fn sent(&self) -> Vec<ManeuverCommand> {
            self.sent.lock().unwrap().clone()
        }
    }

    impl CommandTransport for RecordingTransport {
        fn send(&self, command: &ManeuverCommand) -> Result<(), TransportError> {
            self.sent.lock().unwrap().push(command.clone());
            Ok(())
        }
    }

    struct FailingTransport;

    impl CommandTransport for FailingTransport {
        fn send(&self, _command: &ManeuverCommand) -> Result<(), TransportError> {
            Err(TransportError::LinkUnavailable("no device paired".into()))
        }
    }

    /// Returns its canned response (or an error when none) and counts calls.
    struct ScriptedDirections {
        response: Option<DirectionsResponse>,
        calls: AtomicUsize,
    }

    impl ScriptedDirections {
        fn with_response(response: DirectionsResponse) -> Self {
            Self {
                response: Some(response),
                calls: AtomicUsize::new(0),
            }
        }

        fn unavailable() -> Self {
            Self {
                response: None,
                calls: AtomicUsize::new(0),
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl DirectionsProvider for ScriptedDirections {
        async fn get_route(
            &self,
            _origin: &Origin,
            _destination: &str,
            _mode: &str,
        ) -> Result<DirectionsResponse, DirectionsError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match &self.response {
                Some(response) => Ok(response.clone()),
                None => Err(DirectionsError::Http(
                    reqwest::StatusCode::SERVICE_UNAVAILABLE,
                )),
            }
        }
    }

    fn leg_step(maneuver: Option<&str>, path: &[Coordinate]) -> LegStep {
        LegStep {
            maneuver: maneuver.map(str::to_string),
            end_location: *path.last().unwrap(),
            polyline: PolylinePoints {
                points: encode_polyline(path).unwrap(),
            },
            distance: None,
        }
    }

    fn response_from_steps(steps: Vec<LegStep>) -> DirectionsResponse {
        DirectionsResponse {
            routes: vec![DirectionsRoute {
                legs: vec![RouteLeg {
                    steps,
                    end_address: None,
                    distance: None,
                    duration: None,
                }],
                summary: String::new(),
            }],
            status: "OK".to_string(),
        }
    }

    /// Four steps heading north-east through Waterloo, each ~130 m long.
    fn four_step_response() -> DirectionsResponse {
        let corners = [
            Coordinate::new(43.4700, -80.5500),
            Coordinate::new(43.4710, -80.5490),
            Coordinate::new(43.4720, -80.5480),
            Coordinate::new(43.4730, -80.5470),
            Coordinate::new(43.4740, -80.5460),
        ];
        let maneuvers = [
            Some("turn-left"),
            Some("turn-right"),
            None,
            Some("straight"),
        ];

        response_from_steps(
            maneuvers
                .iter()
                .enumerate()
                .map(|(i, maneuver)| leg_step(*maneuver, &[corners[i], corners[i + 1]]))
                .collect(),
        )
    }

    fn session_with(
        response: DirectionsResponse,
        position: Option<Coordinate>,
        directions: Arc<ScriptedDirections>,
        transport: Arc<RecordingTransport>,
    ) -> (
        NavigationSession<FixedLocation, Arc<ScriptedDirections>, Arc<RecordingTransport>>,
        SessionHandle,
    ) {
        let route = NavRoute::from_response(&response).unwrap();
        NavigationSession::new(
            route,
            FixedLocation(position),
            directions,
            transport,
            "121 Columbia St W, Waterloo".to_string(),
            NavConfig::default(),
        )
    }

    #[tokio::test]
    async fn test_cycle_near_turn_advances_and_sends_one_command() {
        let directions = Arc::new(ScriptedDirections::with_response(four_step_response()));
        let transport = Arc::new(RecordingTransport::default());
        // on the step-0 path and within 10 m of its end
        let position = Coordinate::new(43.4710, -80.5490);
        let (mut session, _handle) = session_with(
            four_step_response(),
            Some(position),
            directions.clone(),
            transport.clone(),
        );

        let outcome = session.cycle().await;

        assert_eq!(outcome, CycleOutcome::Advanced { new_step_index: 1 });
        assert_eq!(session.route().current_index(), 1);

        let sent = transport.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].maneuver, "turn-left");
        assert_eq!(sent[0].direction.as_i8(), -1);
        assert_eq!(directions.calls(), 0);
    }

    #[tokio::test]
    async fn test_on_route_mid_step_sends_nothing() {
        let directions = Arc::new(ScriptedDirections::with_response(four_step_response()));
        let transport = Arc::new(RecordingTransport::default());
        // on the path but ~75 m from the turn point
        let position = Coordinate::new(43.4705, -80.5495);
        let (mut session, _handle) = session_with(
            four_step_response(),
            Some(position),
            directions.clone(),
            transport.clone(),
        );

        let outcome = session.cycle().await;

        match outcome {
            CycleOutcome::OnRoute { distance_to_turn_m } => {
                assert!(distance_to_turn_m > NavConfig::default().advance_threshold_m);
            }
            other => panic!("expected OnRoute, got {other:?}"),
        }
        assert_eq!(session.route().current_index(), 0);
        assert!(transport.sent().is_empty());
        assert_eq!(directions.calls(), 0);
    }

    #[tokio::test]
    async fn test_far_off_route_triggers_exactly_one_reroute() {
        let directions = Arc::new(ScriptedDirections::with_response(four_step_response()));
        let transport = Arc::new(RecordingTransport::default());
        // ~220 m east of the step-0 path
        let position = Coordinate::new(43.4705, -80.5468);
        let (mut session, _handle) = session_with(
            four_step_response(),
            Some(position),
            directions.clone(),
            transport.clone(),
        );

        let outcome = session.cycle().await;

        assert_eq!(outcome, CycleOutcome::Rerouted);
        assert_eq!(directions.calls(), 1);
        // replacement route, cursor back at the start, no commands sent
        assert_eq!(session.route().current_index(), 0);
        assert!(transport.sent().is_empty());
    }

    #[tokio::test]
    async fn test_reroute_failure_keeps_stale_route() {
        let directions = Arc::new(ScriptedDirections::unavailable());
        let transport = Arc::new(RecordingTransport::default());
        let position = Coordinate::new(43.4705, -80.5468);
        let (mut session, _handle) = session_with(
            four_step_response(),
            Some(position),
            directions.clone(),
            transport.clone(),
        );

        let outcome = session.cycle().await;

        assert_eq!(outcome, CycleOutcome::RerouteFailed);
        assert_eq!(directions.calls(), 1);
        assert_eq!(session.route().len(), 4);
        assert_eq!(session.route().current_index(), 0);
        assert_eq!(session.state(), NavState::Navigating);

        // next cycle retries the whole decision, including the re-route
        let outcome = session.cycle().await;
        assert_eq!(outcome, CycleOutcome::RerouteFailed);
        assert_eq!(directions.calls(), 2);
    }

    #[tokio::test]
    async fn test_no_position_fix_skips_cycle() {
        let directions = Arc::new(ScriptedDirections::with_response(four_step_response()));
        let transport = Arc::new(RecordingTransport::default());
        let (mut session, _handle) = session_with(
            four_step_response(),
            None,
            directions.clone(),
            transport.clone(),
        );

        assert_eq!(session.cycle().await, CycleOutcome::Skipped);
        assert_eq!(session.route().current_index(), 0);
        assert!(transport.sent().is_empty());
        assert_eq!(directions.calls(), 0);
    }

    #[tokio::test]
    async fn test_completion_sends_sentinel_exactly_once() {
        let directions = Arc::new(ScriptedDirections::with_response(four_step_response()));
        let transport = Arc::new(RecordingTransport::default());
        let end = Coordinate::new(43.4710, -80.5490);
        let single_step = response_from_steps(vec![leg_step(
            Some("turn-right"),
            &[Coordinate::new(43.4700, -80.5500), end],
        )]);
        let (mut session, _handle) =
            session_with(single_step, Some(end), directions.clone(), transport.clone());

        assert_eq!(
            session.cycle().await,
            CycleOutcome::Advanced { new_step_index: 1 }
        );
        assert_eq!(session.cycle().await, CycleOutcome::Completed);
        assert_eq!(session.state(), NavState::Completed);

        // extra cycles stay terminal and stay quiet
        assert_eq!(session.cycle().await, CycleOutcome::Completed);
        assert_eq!(session.cycle().await, CycleOutcome::Completed);

        let sent = transport.sent();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].maneuver, "turn-right");
        assert_eq!(sent[1].maneuver, COMPLETE_MANEUVER);
        assert_eq!(sent[1].distance, 0.0);
        assert_eq!(
            sent.iter()
                .filter(|c| c.maneuver == COMPLETE_MANEUVER)
                .count(),
            1
        );
    }

    #[tokio::test]
    async fn test_stop_is_observed_and_sends_sentinel_once() {
        let directions = Arc::new(ScriptedDirections::with_response(four_step_response()));
        let transport = Arc::new(RecordingTransport::default());
        let position = Coordinate::new(43.4705, -80.5495);
        let (mut session, handle) = session_with(
            four_step_response(),
            Some(position),
            directions.clone(),
            transport.clone(),
        );

        assert!(matches!(
            session.cycle().await,
            CycleOutcome::OnRoute { .. }
        ));

        handle.stop();
        assert_eq!(session.cycle().await, CycleOutcome::Stopped);
        assert_eq!(session.state(), NavState::Stopped);

        // stopping again changes nothing
        assert_eq!(session.cycle().await, CycleOutcome::Stopped);

        let sent = transport.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].maneuver, COMPLETE_MANEUVER);
    }

    #[tokio::test]
    async fn test_transport_failure_still_advances() {
        let directions = Arc::new(ScriptedDirections::with_response(four_step_response()));
        let position = Coordinate::new(43.4710, -80.5490);
        let route = NavRoute::from_response(&four_step_response()).unwrap();
        let (mut session, _handle) = NavigationSession::new(
            route,
            FixedLocation(Some(position)),
            directions,
            FailingTransport,
            "destination".to_string(),
            NavConfig::default(),
        );

        assert_eq!(
            session.cycle().await,
            CycleOutcome::Advanced { new_step_index: 1 }
        );
        assert_eq!(session.route().current_index(), 1);
    }

    #[tokio::test]
    async fn test_step_without_geometry_never_reroutes() {
        let directions = Arc::new(ScriptedDirections::with_response(four_step_response()));
        let transport = Arc::new(RecordingTransport::default());
        let mut response = four_step_response();
        // undecodable polyline on the current step
        response.routes[0].legs[0].steps[0].polyline.points = "_p~i".to_string();
        // far from everything
        let position = Coordinate::new(43.4600, -80.5600);
        let (mut session, _handle) = session_with(
            response,
            Some(position),
            directions.clone(),
            transport.clone(),
        );

        assert!(matches!(
            session.cycle().await,
            CycleOutcome::OnRoute { .. }
        ));
        assert_eq!(directions.calls(), 0);
    }

    #[tokio::test]
    async fn test_run_drives_session_to_completion() {
        let directions = Arc::new(ScriptedDirections::with_response(four_step_response()));
        let transport = Arc::new(RecordingTransport::default());
        let end = Coordinate::new(43.4710, -80.5490);
        let single_step = response_from_steps(vec![leg_step(
            Some("turn-left"),
            &[Coordinate::new(43.4700, -80.5500), end],
        )]);
        let route = NavRoute::from_response(&single_step).unwrap();
        let (session, _handle) = NavigationSession::new(
            route,
            FixedLocation(Some(end)),
            directions,
            transport.clone(),
            "destination".to_string(),
            NavConfig {
                tick_interval: Duration::from_millis(5),
                ..NavConfig::default()
            },
        );

        let state = tokio::time::timeout(Duration::from_secs(2), session.run())
            .await
            .expect("session should complete quickly");

        assert_eq!(state, NavState::Completed);
        let sent = transport.sent();
        assert_eq!(sent.last().unwrap().maneuver, COMPLETE_MANEUVER);
    }

    #[tokio::test]
    async fn test_run_stops_when_handle_fires() {
        let directions = Arc::new(ScriptedDirections::with_response(four_step_response()));
        let transport = Arc::new(RecordingTransport::default());
        let position = Coordinate::new(43.4705, -80.5495);
        let route = NavRoute::from_response(&four_step_response()).unwrap();
        let (session, handle) = NavigationSession::new(
            route,
            FixedLocation(Some(position)),
            directions,
            transport.clone(),
            "destination".to_string(),
            NavConfig {
                tick_interval: Duration::from_millis(5),
                ..NavConfig::default()
            },
        );

        let task = tokio::spawn(session.run());
        tokio::time::sleep(Duration::from_millis(25)).await;
        handle.stop();

        let state = tokio::time::timeout(Duration::from_secs(2), task)
            .await
            .expect("session should stop quickly")
            .unwrap();

        assert_eq!(state, NavState::Stopped);
        let sent = transport.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].maneuver, COMPLETE_MANEUVER);
    }
}

use prometheus::{IntCounter, IntGauge, Opts, Registry};

/// Orchestrator-level prometheus metrics.
pub struct OrchestratorMetrics {
    /// Number of games currently live (non-terminal).
    pub games_active: IntGauge,
    /// Total games that reached a terminal phase.
    pub games_finished: IntCounter,
    /// Total moves committed to move logs.
    pub moves_committed: IntCounter,
    /// Total collaborator request retries.
    pub gateway_retries: IntCounter,
    /// Total faults that paused a game.
    pub faults_raised: IntCounter,
}

impl OrchestratorMetrics {
    /// Create metrics and register them with the given prometheus registry.
    pub fn new(registry: &Registry) -> Result<Self, prometheus::Error> {
        let games_active = IntGauge::with_opts(Opts::new(
            "gambit_games_active",
            "Number of games currently live",
        ))?;
        let games_finished = IntCounter::with_opts(Opts::new(
            "gambit_games_finished_total",
            "Total games that reached a terminal phase",
        ))?;
        let moves_committed = IntCounter::with_opts(Opts::new(
            "gambit_moves_committed_total",
            "Total moves committed to move logs",
        ))?;
        let gateway_retries = IntCounter::with_opts(Opts::new(
            "gambit_gateway_retries_total",
            "Total collaborator request retries",
        ))?;
        let faults_raised = IntCounter::with_opts(Opts::new(
            "gambit_faults_raised_total",
            "Total faults that paused a game",
        ))?;

        registry.register(Box::new(games_active.clone()))?;
        registry.register(Box::new(games_finished.clone()))?;
        registry.register(Box::new(moves_committed.clone()))?;
        registry.register(Box::new(gateway_retries.clone()))?;
        registry.register(Box::new(faults_raised.clone()))?;

        Ok(Self {
            games_active,
            games_finished,
            moves_committed,
            gateway_retries,
            faults_raised,
        })
    }

    /// Create metrics without registering (for testing).
    pub fn unregistered() -> Self {
        Self {
            games_active: IntGauge::new("gambit_games_active", "active")
                .expect("valid metric name"),
            games_finished: IntCounter::new("gambit_games_finished_total", "finished")
                .expect("valid metric name"),
            moves_committed: IntCounter::new("gambit_moves_committed_total", "moves")
                .expect("valid metric name"),
            gateway_retries: IntCounter::new("gambit_gateway_retries_total", "retries")
                .expect("valid metric name"),
            faults_raised: IntCounter::new("gambit_faults_raised_total", "faults")
                .expect("valid metric name"),
        }
    }
}

//! The per-line pipeline: parse, enrich, filter, render.
//!
//! Each line is processed to completion before the next one is read, so the
//! display order is the feed order.

use std::io::{self, Write};

use crossterm::style::Color;
use tracing::{debug, error};

use crate::client::{FeedEvent, FeedHandler};
use crate::enrich::EnrichmentCache;
use crate::filter::{FilterChain, Verdict};
use crate::parser::{SpotParser, TokenParser, looks_like_spot};
use crate::qrz::CallbookService;
use crate::render::{Emitted, Highlight, Renderer};
use crate::spot::Spot;
use crate::station::StationRecord;
use crate::stats::{PipelineStats, StatsSummary};
use crate::store::StoreError;

pub struct SpotPipeline<S, W: Write, P = TokenParser> {
    parser: P,
    enrichment: EnrichmentCache<S>,
    filter: FilterChain,
    renderer: Renderer<W>,
    my_call: String,
    reconnect: bool,
    stats: PipelineStats,
}

impl<S, W> SpotPipeline<S, W>
where
    S: CallbookService,
    W: Write,
{
    pub fn new(
        enrichment: EnrichmentCache<S>,
        filter: FilterChain,
        renderer: Renderer<W>,
        my_call: impl Into<String>,
    ) -> Self {
        Self::with_parser(TokenParser, enrichment, filter, renderer, my_call)
    }
}

impl<S, W, P> SpotPipeline<S, W, P>
where
    S: CallbookService,
    W: Write,
    P: SpotParser,
{
    pub fn with_parser(
        parser: P,
        enrichment: EnrichmentCache<S>,
        filter: FilterChain,
        renderer: Renderer<W>,
        my_call: impl Into<String>,
    ) -> Self {
        Self {
            parser,
            enrichment,
            filter,
            renderer,
            my_call: my_call.into(),
            reconnect: true,
            stats: PipelineStats::new(),
        }
    }

    /// Whether a disconnect notice should announce a retry.
    pub fn with_reconnect(mut self, reconnect: bool) -> Self {
        self.reconnect = reconnect;
        self
    }

    /// Process one raw feed line.
    ///
    /// Malformed lines are counted and dropped. Only a failed write to the
    /// display is an error.
    pub async fn process_line(&mut self, line: &str) -> io::Result<()> {
        self.stats.lines += 1;

        if !looks_like_spot(line) {
            self.stats.non_spot_lines += 1;
            debug!("Ignoring non-spot line: {}", line);
            return Ok(());
        }

        let spot = match self.parser.parse(line) {
            Ok(spot) => spot,
            Err(e) => {
                self.stats.parse_failures += 1;
                debug!("Rejected line ({}): {}", e, line);
                return Ok(());
            }
        };
        self.stats.spots += 1;

        self.process_spot(&spot).await
    }

    async fn process_spot(&mut self, spot: &Spot) -> io::Result<()> {
        if let Some(rejection) = self.filter.screen(spot) {
            debug!("Filtered {} ({})", spot.dx_call, rejection);
            self.stats.filtered += 1;
            return self.renderer.rejected();
        }

        // A spot of my own call is described by the station that heard me
        let self_spot = spot.dx_call == self.my_call;
        let de = if self_spot || self.filter.needs_de_station() {
            self.enrichment.resolve(&spot.de_call).await.into_record()
        } else {
            None
        };
        let dx = if self_spot {
            de.clone()
        } else {
            self.enrichment.resolve(&spot.dx_call).await.into_record()
        };

        match self.filter.evaluate(spot, de.as_ref(), dx.as_ref()) {
            Verdict::Reject(rejection) => {
                debug!("Filtered {} ({})", spot.dx_call, rejection);
                self.stats.filtered += 1;
                self.renderer.rejected()
            }
            verdict => {
                if verdict == Verdict::Friend {
                    self.stats.friend_overrides += 1;
                }
                self.show(spot, dx.as_ref())
            }
        }
    }

    fn show(&mut self, spot: &Spot, station: Option<&StationRecord>) -> io::Result<()> {
        self.stats.record_pass(spot);
        let highlight = Highlight::classify(
            &spot.dx_call,
            &self.my_call,
            self.filter.is_friend(&spot.dx_call),
        );
        if self.renderer.emit(spot, station, highlight)? == Emitted::Repeat {
            self.stats.repeats += 1;
        }
        Ok(())
    }

    /// Print an operator notice, erasing any pending progress markers.
    pub fn notice(&mut self, text: &str) -> io::Result<()> {
        self.renderer.notice(text, None)
    }

    fn disconnected(&mut self, reason: &str) -> io::Result<()> {
        self.stats.disconnects += 1;
        self.renderer
            .notice(&format!("Connection failed: {}", reason), Some(Color::Red))?;
        if self.reconnect {
            self.renderer.notice("Retrying...", None)?;
        }
        Ok(())
    }

    /// Write the station store to disk.
    pub fn flush_store(&mut self) -> Result<(), StoreError> {
        self.enrichment.flush()
    }

    pub fn stats(&self) -> &PipelineStats {
        &self.stats
    }

    pub fn enrichment(&self) -> &EnrichmentCache<S> {
        &self.enrichment
    }

    pub fn renderer(&self) -> &Renderer<W> {
        &self.renderer
    }

    pub fn summary(&self) -> StatsSummary {
        self.stats.summary(self.enrichment.stats())
    }
}

impl<S, W, P> FeedHandler for SpotPipeline<S, W, P>
where
    S: CallbookService,
    W: Write,
    P: SpotParser,
{
    async fn handle(&mut self, event: FeedEvent) {
        let result = match event {
            FeedEvent::Connected | FeedEvent::Streaming => Ok(()),
            FeedEvent::Line(line) => self.process_line(&line).await,
            FeedEvent::Disconnected(reason) => self.disconnected(&reason),
        };
        if let Err(e) = result {
            error!("Failed to write to the display: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::enrich::testing::ScriptedCallbook;
    use crate::filter::{FilterConfig, Selector};
    use crate::parser::GrammarParser;
    use crate::qrz::LookupOutcome;
    use crate::spot::{Band, Mode};
    use crate::store::StationStore;

    const EXAMPLE: &str =
        "DX de W1AW-#:    14025.0  JA1XYZ       CW    12 dB   22 WPM  CQ      1234Z";

    fn station(call: &str, grid: &str, cq: u8) -> StationRecord {
        StationRecord {
            grid: Some(grid.to_string()),
            cq_zone: Some(cq),
            country: Some("Somewhere".to_string()),
            ..StationRecord::new(call)
        }
    }

    fn config(min_wpm: u16, max_wpm: u16) -> FilterConfig {
        FilterConfig {
            bands: vec![Band::M20],
            modes: [Mode::Cw].into_iter().collect(),
            min_wpm,
            max_wpm,
            ..Default::default()
        }
    }

    fn pipeline(
        service: ScriptedCallbook,
        config: FilterConfig,
        my_call: &str,
    ) -> SpotPipeline<ScriptedCallbook, Vec<u8>> {
        SpotPipeline::new(
            EnrichmentCache::new(service, StationStore::in_memory()),
            FilterChain::new(config).unwrap(),
            Renderer::new(Vec::new(), None).with_width(20),
            my_call,
        )
    }

    fn known_stations() -> ScriptedCallbook {
        ScriptedCallbook::with_records([station("W1AW", "FN31pr", 5), station("JA1XYZ", "PM95vq", 25)])
    }

    fn output<S: CallbookService, P: SpotParser>(p: &SpotPipeline<S, Vec<u8>, P>) -> String {
        String::from_utf8_lossy(p.renderer().get_ref()).into_owned()
    }

    #[tokio::test]
    async fn test_matching_spot_is_rendered() {
        let mut p = pipeline(known_stations(), config(15, 30), "N1MM");
        p.process_line(EXAMPLE).await.unwrap();

        let text = output(&p);
        for expected in ["JA1XYZ", "W1AW", "14025.0", "CW", "22 WPM"] {
            assert!(text.contains(expected), "missing {} in {:?}", expected, text);
        }
        assert_eq!(text.lines().count(), 1);
        assert_eq!(p.stats().passed, 1);
    }

    #[tokio::test]
    async fn test_speed_mismatch_prints_progress_only() {
        let mut p = pipeline(known_stations(), config(25, 30), "N1MM");
        p.process_line(EXAMPLE).await.unwrap();

        assert_eq!(output(&p), ".");
        assert_eq!(p.stats().filtered, 1);
        // Screened out before any lookup
        assert!(p.enrichment().service().lookups.is_empty());
    }

    #[tokio::test]
    async fn test_repeat_spot_prints_marker() {
        let mut p = pipeline(known_stations(), config(15, 30), "N1MM");
        p.process_line(EXAMPLE).await.unwrap();
        p.process_line(EXAMPLE).await.unwrap();

        let text = output(&p);
        assert_eq!(text.matches("JA1XYZ").count(), 1);
        assert!(text.ends_with('*'));
        assert_eq!(p.stats().repeats, 1);
        // The second pass is answered from the store
        assert_eq!(p.enrichment().service().lookups, vec!["JA1XYZ"]);
    }

    #[tokio::test]
    async fn test_malformed_lines_do_not_stop_processing() {
        let mut p = pipeline(known_stations(), config(15, 30), "N1MM");
        p.process_line("DX de W1AW-#: 14O25.0 JA1XYZ CW 12 dB 22 WPM CQ 1234Z")
            .await
            .unwrap();
        p.process_line("DX de W1AW-#: 14025.0 JA1XYZ CW 12 dB 22 WPM 1234Z")
            .await
            .unwrap();
        p.process_line("W1AW de RELAY 1234Z >").await.unwrap();
        p.process_line(EXAMPLE).await.unwrap();

        assert_eq!(p.stats().lines, 4);
        assert_eq!(p.stats().parse_failures, 2);
        assert_eq!(p.stats().non_spot_lines, 1);
        assert_eq!(p.stats().passed, 1);
        assert!(output(&p).contains("JA1XYZ"));
    }

    #[tokio::test]
    async fn test_friend_overrides_filters() {
        let mut cfg = config(25, 30);
        cfg.friends.insert("JA1XYZ".to_string());
        let mut p = pipeline(known_stations(), cfg, "N1MM");
        p.process_line(EXAMPLE).await.unwrap();

        let text = output(&p);
        assert!(text.contains("JA1XYZ"));
        // Friend lines are highlighted
        assert!(text.starts_with("\x1b["));
        assert_eq!(p.stats().friend_overrides, 1);
    }

    #[tokio::test]
    async fn test_zone_filter_uses_enrichment() {
        let mut cfg = config(15, 30);
        cfg.dx_cq_zones = Selector::Only([25].into_iter().collect());
        let mut p = pipeline(known_stations(), cfg.clone(), "N1MM");
        p.process_line(EXAMPLE).await.unwrap();
        assert!(output(&p).contains("JA1XYZ"));

        cfg.dx_cq_zones = Selector::Only([3].into_iter().collect());
        let mut p = pipeline(known_stations(), cfg, "N1MM");
        p.process_line(EXAMPLE).await.unwrap();
        assert_eq!(output(&p), ".");
    }

    #[tokio::test]
    async fn test_lookup_error_is_no_data() {
        let mut cfg = config(15, 30);
        cfg.dx_cq_zones = Selector::Only([25].into_iter().collect());
        let service =
            ScriptedCallbook::scripted([LookupOutcome::ServiceError("timeout".to_string())]);
        let mut p = pipeline(service, cfg, "N1MM");

        p.process_line(EXAMPLE).await.unwrap();
        assert_eq!(output(&p), ".");
        assert_eq!(p.enrichment().stats().errors, 1);
    }

    #[tokio::test]
    async fn test_de_station_resolved_only_when_needed() {
        let mut p = pipeline(known_stations(), config(15, 30), "N1MM");
        p.process_line(EXAMPLE).await.unwrap();
        assert_eq!(p.enrichment().service().lookups, vec!["JA1XYZ"]);

        let mut cfg = config(15, 30);
        cfg.de_grids = Selector::Only(["FN".to_string()].into_iter().collect());
        let mut p = pipeline(known_stations(), cfg, "N1MM");
        p.process_line(EXAMPLE).await.unwrap();
        assert_eq!(p.enrichment().service().lookups, vec!["W1AW", "JA1XYZ"]);
        assert!(output(&p).contains("JA1XYZ"));
    }

    #[tokio::test]
    async fn test_self_spot_uses_spotter_station() {
        let mut cfg = config(15, 30);
        cfg.dx_grids = Selector::Only(["FN".to_string()].into_iter().collect());
        let mut p = pipeline(known_stations(), cfg, "K9ME");

        p.process_line("DX de W1AW-#:    14025.0  K9ME         CW    12 dB   22 WPM  CQ      1234Z")
            .await
            .unwrap();

        let text = output(&p);
        assert!(text.contains("K9ME"));
        assert!(text.contains("Somewhere"));
        assert!(text.starts_with("\x1b["));
        assert_eq!(p.enrichment().service().lookups, vec!["W1AW"]);
    }

    #[tokio::test]
    async fn test_grammar_parser_behind_same_contract() {
        let mut p = SpotPipeline::with_parser(
            GrammarParser,
            EnrichmentCache::new(known_stations(), StationStore::in_memory()),
            FilterChain::new(config(15, 30)).unwrap(),
            Renderer::new(Vec::new(), None).with_width(20),
            "N1MM",
        );
        p.process_line(EXAMPLE).await.unwrap();
        assert!(output(&p).contains("JA1XYZ"));
    }

    #[tokio::test]
    async fn test_feed_events() {
        let mut p = pipeline(known_stations(), config(15, 30), "N1MM");
        p.handle(FeedEvent::Connected).await;
        p.handle(FeedEvent::Streaming).await;
        p.handle(FeedEvent::Line(EXAMPLE.to_string())).await;
        p.handle(FeedEvent::Disconnected("connection reset".to_string()))
            .await;

        let text = output(&p);
        assert!(text.contains("JA1XYZ"));
        assert!(text.contains("Connection failed: connection reset"));
        assert!(text.ends_with("Retrying...\n"));
        assert_eq!(p.stats().disconnects, 1);
    }

    #[tokio::test]
    async fn test_no_retry_notice_without_reconnect() {
        let mut p = pipeline(known_stations(), config(15, 30), "N1MM").with_reconnect(false);
        p.handle(FeedEvent::Disconnected("closed".to_string())).await;
        assert!(!output(&p).contains("Retrying"));
    }
}

//! Backlog gap analysis
//!
//! Groups episodes without files by series and season and decides how to search
//! for them. A season whose every episode is missing is searched as a whole;
//! anything else is searched episode by episode.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::db::{EpisodeRecord, EpisodeRepository, SeasonRepository};

/// A search request produced by backlog analysis
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SearchCommand {
    EpisodeSearch {
        series_id: i64,
        season_number: i32,
        episode_id: i64,
        episode_number: i32,
    },
    SeasonSearch {
        series_id: i64,
        season_number: i32,
    },
}

impl SearchCommand {
    pub fn series_id(&self) -> i64 {
        match self {
            SearchCommand::EpisodeSearch { series_id, .. } | SearchCommand::SeasonSearch { series_id, .. } => {
                *series_id
            }
        }
    }

    pub fn season_number(&self) -> i32 {
        match self {
            SearchCommand::EpisodeSearch { season_number, .. }
            | SearchCommand::SeasonSearch { season_number, .. } => *season_number,
        }
    }

    pub fn is_season_search(&self) -> bool {
        matches!(self, SearchCommand::SeasonSearch { .. })
    }

    fn sort_key(&self) -> (i64, i32, i32) {
        match self {
            SearchCommand::EpisodeSearch {
                series_id,
                season_number,
                episode_number,
                ..
            } => (*series_id, *season_number, *episode_number),
            SearchCommand::SeasonSearch {
                series_id,
                season_number,
            } => (*series_id, *season_number, 0),
        }
    }

    fn for_episode(episode: &EpisodeRecord) -> Self {
        SearchCommand::EpisodeSearch {
            series_id: episode.series_id,
            season_number: episode.season_number,
            episode_id: episode.id,
            episode_number: episode.episode_number,
        }
    }
}

impl std::fmt::Display for SearchCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SearchCommand::EpisodeSearch {
                series_id,
                season_number,
                episode_number,
                ..
            } => write!(f, "episode search {}:S{:02}E{:02}", series_id, season_number, episode_number),
            SearchCommand::SeasonSearch {
                series_id,
                season_number,
            } => write!(f, "season search {}:S{:02}", series_id, season_number),
        }
    }
}

/// Sink for search commands
#[async_trait]
pub trait SearchDispatcher: Send + Sync {
    async fn dispatch(&self, command: SearchCommand) -> Result<()>;
}

/// Missing episodes of one series season
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeasonGapGroup {
    pub series_id: i64,
    pub season_number: i32,
    pub missing_episode_numbers: BTreeSet<i32>,
}

pub struct BacklogAnalyzer {
    seasons: Arc<dyn SeasonRepository>,
}

impl BacklogAnalyzer {
    pub fn new(seasons: Arc<dyn SeasonRepository>) -> Self {
        Self { seasons }
    }

    /// Turn missing episodes into search commands ordered by series, season and episode
    pub async fn analyze(&self, missing: &[EpisodeRecord]) -> Vec<SearchCommand> {
        let mut commands = Vec::new();
        let mut groups: BTreeMap<(i64, i32), Vec<&EpisodeRecord>> = BTreeMap::new();
        let mut seen = HashSet::new();

        for episode in missing {
            if !seen.insert(episode.id) {
                continue;
            }
            if episode.is_special() {
                commands.push(SearchCommand::for_episode(episode));
            } else {
                groups
                    .entry((episode.series_id, episode.season_number))
                    .or_default()
                    .push(episode);
            }
        }

        for ((series_id, season_number), episodes) in groups {
            if episodes.len() == 1 {
                commands.push(SearchCommand::for_episode(episodes[0]));
                continue;
            }

            let group = SeasonGapGroup {
                series_id,
                season_number,
                missing_episode_numbers: episodes.iter().map(|e| e.episode_number).collect(),
            };

            if self.is_whole_season_missing(&group).await {
                debug!(series_id = series_id, season = season_number, "Whole season missing");
                commands.push(SearchCommand::SeasonSearch {
                    series_id,
                    season_number,
                });
            } else {
                commands.extend(episodes.into_iter().map(SearchCommand::for_episode));
            }
        }

        commands.sort_by_key(SearchCommand::sort_key);
        commands
    }

    /// A failed lookup counts as "not the whole season"
    async fn is_whole_season_missing(&self, group: &SeasonGapGroup) -> bool {
        match self
            .seasons
            .episode_numbers_of_season(group.series_id, group.season_number)
            .await
        {
            Ok(total) => total == group.missing_episode_numbers,
            Err(e) => {
                warn!(
                    series_id = group.series_id,
                    season = group.season_number,
                    error = %e,
                    "Failed to load season episodes, searching episodes individually"
                );
                false
            }
        }
    }
}

/// Outcome of one backlog sweep
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BacklogReport {
    pub missing_episodes: usize,
    pub season_searches: usize,
    pub episode_searches: usize,
    pub dispatch_failures: usize,
    pub cancelled: bool,
}

/// Loads the backlog, analyzes it and dispatches the resulting searches
pub struct BacklogSweep {
    episodes: Arc<dyn EpisodeRepository>,
    analyzer: BacklogAnalyzer,
    dispatcher: Arc<dyn SearchDispatcher>,
}

impl BacklogSweep {
    pub fn new(
        episodes: Arc<dyn EpisodeRepository>,
        seasons: Arc<dyn SeasonRepository>,
        dispatcher: Arc<dyn SearchDispatcher>,
    ) -> Self {
        Self {
            episodes,
            analyzer: BacklogAnalyzer::new(seasons),
            dispatcher,
        }
    }

    pub async fn run(&self, cancel: &CancellationToken) -> Result<BacklogReport> {
        let missing = self
            .episodes
            .episodes_without_files(true)
            .await
            .context("Failed to load missing episodes")?;

        let commands = self.analyzer.analyze(&missing).await;
        let mut report = BacklogReport {
            missing_episodes: missing.len(),
            ..Default::default()
        };

        for command in commands {
            if cancel.is_cancelled() {
                info!("Backlog sweep cancelled");
                report.cancelled = true;
                break;
            }

            if command.is_season_search() {
                report.season_searches += 1;
            } else {
                report.episode_searches += 1;
            }

            if let Err(e) = self.dispatcher.dispatch(command.clone()).await {
                warn!(command = %command, error = %e, "Failed to dispatch search");
                report.dispatch_failures += 1;
            }
        }

        info!(
            missing = report.missing_episodes,
            season_searches = report.season_searches,
            episode_searches = report.episode_searches,
            failures = report.dispatch_failures,
            "Backlog sweep finished"
        );

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;

    #[derive(Default)]
    struct FakeSeasons {
        totals: HashMap<(i64, i32), BTreeSet<i32>>,
        fail: bool,
    }

    #[async_trait]
    impl SeasonRepository for FakeSeasons {
        async fn is_ignored(&self, _series_id: i64, _season_number: i32) -> Result<bool> {
            Ok(false)
        }

        async fn episode_numbers_of_season(&self, series_id: i64, season_number: i32) -> Result<BTreeSet<i32>> {
            if self.fail {
                anyhow::bail!("storage offline");
            }
            Ok(self.totals.get(&(series_id, season_number)).cloned().unwrap_or_default())
        }
    }

    fn analyzer(totals: Vec<((i64, i32), Vec<i32>)>) -> BacklogAnalyzer {
        BacklogAnalyzer::new(Arc::new(FakeSeasons {
            totals: totals
                .into_iter()
                .map(|(key, eps)| (key, eps.into_iter().collect()))
                .collect(),
            fail: false,
        }))
    }

    fn ep(id: i64, series: i64, season: i32, number: i32) -> EpisodeRecord {
        EpisodeRecord::missing(id, series, season, number)
    }

    // =========================================================================
    // Grouping decisions
    // =========================================================================

    #[tokio::test]
    async fn test_singleton_is_episode_search() {
        let commands = analyzer(vec![]).analyze(&[ep(1, 10, 1, 3)]).await;
        assert_eq!(
            commands,
            vec![SearchCommand::EpisodeSearch {
                series_id: 10,
                season_number: 1,
                episode_id: 1,
                episode_number: 3,
            }]
        );
    }

    #[tokio::test]
    async fn test_whole_season_missing_is_season_search() {
        let missing: Vec<_> = (1..=5).map(|n| ep(n as i64, 10, 1, n)).collect();
        let commands = analyzer(vec![((10, 1), (1..=5).collect())]).analyze(&missing).await;
        assert_eq!(
            commands,
            vec![SearchCommand::SeasonSearch {
                series_id: 10,
                season_number: 1,
            }]
        );
    }

    #[tokio::test]
    async fn test_partial_season_is_episode_searches() {
        let missing: Vec<_> = (1..=5).map(|n| ep(n as i64, 10, 1, n)).collect();
        let commands = analyzer(vec![((10, 1), (1..=10).collect())]).analyze(&missing).await;
        assert_eq!(commands.len(), 5);
        assert!(commands.iter().all(|c| !c.is_season_search()));
    }

    #[tokio::test]
    async fn test_same_count_different_members_is_episode_searches() {
        let missing = vec![ep(1, 10, 1, 1), ep(2, 10, 1, 2)];
        let commands = analyzer(vec![((10, 1), vec![1, 3])]).analyze(&missing).await;
        assert_eq!(commands.len(), 2);
        assert!(commands.iter().all(|c| !c.is_season_search()));
    }

    #[tokio::test]
    async fn test_mixed_backlog() {
        let mut missing: Vec<_> = (1..=5).map(|n| ep(n as i64, 10, 1, n)).collect();
        missing.extend((6..=10).map(|n| ep(n as i64, 20 + n as i64, 2, 1)));

        let commands = analyzer(vec![((10, 1), (1..=5).collect())]).analyze(&missing).await;
        assert_eq!(commands.iter().filter(|c| c.is_season_search()).count(), 1);
        assert_eq!(commands.iter().filter(|c| !c.is_season_search()).count(), 5);
    }

    #[tokio::test]
    async fn test_empty_backlog() {
        assert!(analyzer(vec![]).analyze(&[]).await.is_empty());
    }

    #[tokio::test]
    async fn test_specials_are_never_grouped() {
        let missing = vec![ep(1, 10, 0, 1), ep(2, 10, 0, 2)];
        let commands = analyzer(vec![((10, 0), vec![1, 2])]).analyze(&missing).await;
        assert_eq!(commands.len(), 2);
        assert!(commands.iter().all(|c| !c.is_season_search()));
    }

    #[tokio::test]
    async fn test_lookup_failure_falls_back_to_episodes() {
        let analyzer = BacklogAnalyzer::new(Arc::new(FakeSeasons {
            totals: HashMap::new(),
            fail: true,
        }));
        let missing = vec![ep(1, 10, 1, 1), ep(2, 10, 1, 2)];
        let commands = analyzer.analyze(&missing).await;
        assert_eq!(commands.len(), 2);
    }

    #[tokio::test]
    async fn test_output_is_ordered() {
        let missing = vec![ep(3, 20, 1, 1), ep(2, 10, 2, 4), ep(1, 10, 2, 2), ep(4, 10, 1, 9)];
        let commands = analyzer(vec![((10, 2), (1..=10).collect())]).analyze(&missing).await;
        let keys: Vec<_> = commands.iter().map(SearchCommand::sort_key).collect();
        assert_eq!(keys, vec![(10, 1, 9), (10, 2, 2), (10, 2, 4), (20, 1, 1)]);
    }

    // =========================================================================
    // Sweep
    // =========================================================================

    struct FakeEpisodes(Vec<EpisodeRecord>);

    #[async_trait]
    impl EpisodeRepository for FakeEpisodes {
        async fn episodes_for_descriptor(
            &self,
            _descriptor: &crate::services::release_parser::ReleaseDescriptor,
        ) -> Result<Vec<EpisodeRecord>> {
            Ok(Vec::new())
        }

        async fn episodes_without_files(&self, _monitored_only: bool) -> Result<Vec<EpisodeRecord>> {
            Ok(self.0.clone())
        }
    }

    #[derive(Default)]
    struct RecordingDispatcher {
        commands: Mutex<Vec<SearchCommand>>,
    }

    #[async_trait]
    impl SearchDispatcher for RecordingDispatcher {
        async fn dispatch(&self, command: SearchCommand) -> Result<()> {
            self.commands.lock().push(command);
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_sweep_dispatches_every_command() {
        let mut missing: Vec<_> = (1..=3).map(|n| ep(n as i64, 10, 1, n)).collect();
        missing.push(ep(9, 11, 4, 2));

        let dispatcher = Arc::new(RecordingDispatcher::default());
        let seasons = Arc::new(FakeSeasons {
            totals: HashMap::from([((10, 1), BTreeSet::from([1, 2, 3]))]),
            fail: false,
        });
        let sweep = BacklogSweep::new(Arc::new(FakeEpisodes(missing)), seasons, dispatcher.clone());

        let report = sweep.run(&CancellationToken::new()).await.unwrap();
        assert_eq!(
            report,
            BacklogReport {
                missing_episodes: 4,
                season_searches: 1,
                episode_searches: 1,
                dispatch_failures: 0,
                cancelled: false,
            }
        );
        assert_eq!(dispatcher.commands.lock().len(), 2);
    }

    #[tokio::test]
    async fn test_cancelled_sweep_dispatches_nothing() {
        let dispatcher = Arc::new(RecordingDispatcher::default());
        let sweep = BacklogSweep::new(
            Arc::new(FakeEpisodes(vec![ep(1, 10, 1, 1)])),
            Arc::new(FakeSeasons::default()),
            dispatcher.clone(),
        );

        let cancel = CancellationToken::new();
        cancel.cancel();
        let report = sweep.run(&cancel).await.unwrap();
        assert!(report.cancelled);
        assert!(dispatcher.commands.lock().is_empty());
    }
}

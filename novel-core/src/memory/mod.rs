//! Story memory: every fact established so far about a novel.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                          NovelMemory                             │
//! │                                                                  │
//! │  ┌──────────────┐  ┌──────────────┐  ┌────────────────────────┐  │
//! │  │ CoreSettings │  │ WorldView    │  │ Characters (name→prof) │  │
//! │  └──────────────┘  └──────────────┘  └────────────────────────┘  │
//! │  ┌──────────────┐  ┌──────────────┐  ┌────────────────────────┐  │
//! │  │ Summaries    │  │ Timeline     │  │ Locations (name→loc)   │  │
//! │  │ (chapter→…)  │  │ (append-only)│  └────────────────────────┘  │
//! │  └──────────────┘  └──────────────┘  ┌────────────────────────┐  │
//! │  ┌──────────────────────────────┐    │ RelationshipGraph      │  │
//! │  │ PlotThreads (keyword match)  │    │ (unordered pair→…)     │  │
//! │  └──────────────────────────────┘    └────────────────────────┘  │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Names are the only identity keys. Development history, the timeline and
//! per-thread chapter lists only grow; `clear` is the one way to drop data.

mod chapter;
mod character;
pub(crate) mod lenient;
mod location;
mod plot;
mod relationship;
mod report;
mod store;
mod world;

pub use chapter::{ChapterSummary, TimelineEvent, TimelineEventKind};
pub use character::{CharacterProfile, CharacterUpdate, DevelopmentNote, DEFAULT_IMPORTANCE};
pub use location::Location;
pub use plot::{PlotStatus, PlotThread, OPEN_END};
pub use relationship::{CharacterPair, Interaction, RelationshipGraph};
pub use report::{ProgressStats, SearchHit, SearchSource, DEFAULT_SEARCH_LIMIT};
pub use store::{NovelMemory, PlotUpdate, CHAPTER_PLAN_KEY, OUTLINE_KEY};
pub use world::{CoreSettings, WorldView, BOOKKEEPING_KEYS};

/// Data layer: core types, run-directory loading, and the metadata store.
///
/// Architecture:
/// ```text
///  1..11 / 12-0 / 12-1 (.parquet | .csv | .json)   CMDataSettings.txt
///        │                                           │
///        ▼                                           ▼
///   ┌──────────┐                               ┌──────────┐
///   │  loader   │ ◄──── sample limit ───────── │ settings  │
///   └──────────┘                               └──────────┘
///        │
///        ▼
///   ┌──────────┐        Experiment_data.txt
///   │  RunData  │        ┌──────────┐
///   └──────────┘        │ metadata  │  get / upsert / persist
///                        └──────────┘
/// ```

pub mod loader;
pub mod metadata;
pub mod model;
pub mod settings;
pub mod writer;

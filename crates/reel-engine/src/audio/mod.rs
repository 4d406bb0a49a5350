//! Song analysis: energy curve, segment selection and beat grids.

pub mod beats;
pub mod envelope;
pub mod segment;

pub use beats::{
    detector_from_config, slice_beats, BeatDetector, BeatGrid, BeatSlice, CommandBeatDetector,
    EnergyBeatDetector,
};
pub use segment::{select_from_audio, select_song_segment, SongRequest, SongSegment};

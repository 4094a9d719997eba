//! Streaming etalon detector.
//!
//! Listens to an audio input, keeps the last two seconds in a rolling
//! buffer, and fires an action when a known reference sound ("etalon")
//! shows up in it.
//!
//! | Module | Role |
//! |--------|------|
//! | [`audio`] | capture thread, bounded drop-oldest block queue, cpal device |
//! | [`matcher`] | etalon loading, rolling window, cross-correlation, decision |
//! | [`action`] | what happens on a match (launch a program) |
//! | [`pipeline`] | consumer loop and run outcome |
//! | [`app`] | startup ordering |
//! | [`config`] | `settings.toml` |

pub mod action;
pub mod app;
pub mod audio;
pub mod config;
pub mod matcher;
pub mod pipeline;

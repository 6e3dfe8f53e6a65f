//! Console fraud monitor: streams call audio to Gemini Live and reports risk verdicts.

pub mod config;
pub mod monitor;

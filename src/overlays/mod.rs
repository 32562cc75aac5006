//! Reference layers drawn over the heatmap tiles

pub mod neighborhoods;

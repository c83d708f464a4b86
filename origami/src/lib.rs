// error and configuration
pub mod error;
pub mod config;

// data module
pub mod data {
    pub mod spectrum;
    pub mod heatmap;
    pub mod peak;
}

// algorithm module
pub mod algorithm {
    pub mod utility;
    pub mod linearize;
    pub mod smoothing;
    pub mod baseline;
    pub mod normalize;
    pub mod peaks;
    pub mod downsample;
    pub mod origami_ms;
}

// pipelines
pub mod processing;

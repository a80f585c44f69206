pub(crate) mod jobs;
pub(crate) mod migrate;
pub(crate) mod serve;

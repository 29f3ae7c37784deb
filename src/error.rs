use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum Error {
  #[error("couldn't read {path:?}: {source}")]
  Io {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },
  #[error("couldn't parse config: {0}")]
  ConfigParse(#[from] toml::de::Error),
  #[error("couldn't serialize config: {0}")]
  ConfigSerialize(#[from] toml::ser::Error),
  #[error("no compatible GPU adapter found")]
  NoAdapter,
  #[error("GPU device request failed: {0}")]
  RequestDevice(#[from] wgpu::RequestDeviceError),
}

pub type Result<T> = std::result::Result<T, Error>;

//! Generic parameters functions

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use serde::de::DeserializeOwned;
use std::fs::read_to_string;
use std::path::Path;
use thiserror::Error;
use toml;

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// An error that occurs during loading of a parameter file.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("Cannot find the software root directory: {0}")]
    SwRootNotFound(std::io::Error),

    #[error("Cannot load the parmeter file: {0}")]
    FileLoadError(std::io::Error),

    #[error("Cannot read the parameter file: {0}")]
    DeserialiseError(toml::de::Error)
}

// ---------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ---------------------------------------------------------------------------

/// Load a parameter file
///
/// The file path is relative to the "params" directory under the software
/// root (see `host::get_sw_root`).
pub fn load<P>(param_file_path: &str) -> Result<P, LoadError> 
where
    P: DeserializeOwned
{
    // Get the params dir
    let mut path = crate::host::get_sw_root()
        .map_err(LoadError::SwRootNotFound)?;
    path.push("params");
    path.push(param_file_path);

    load_from(&path)
}

/// Load a parameter file from an explicit path.
pub fn load_from<P>(path: &Path) -> Result<P, LoadError>
where
    P: DeserializeOwned
{
    // Load the file into a string
    let params_str = read_to_string(path)
        .map_err(LoadError::FileLoadError)?;

    // Parse the string into the parameter struct
    toml::from_str(params_str.as_str())
        .map_err(LoadError::DeserialiseError)
}

#[cfg(test)]
mod test {
    use super::*;
    use serde::Deserialize;

    #[derive(Deserialize)]
    struct TestParams {
        horizon_len: usize,
        dt_s: f64
    }

    #[test]
    fn test_load_from() {
        let mut path = std::env::temp_dir();
        path.push(format!("util_params_test_{}.toml", std::process::id()));
        std::fs::write(&path, "horizon_len = 10\ndt_s = 0.1\n").unwrap();

        let params: TestParams = load_from(&path).unwrap();
        assert_eq!(params.horizon_len, 10);
        assert_eq!(params.dt_s, 0.1);

        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_load_from_missing_file() {
        let path = std::env::temp_dir().join("util_params_test_does_not_exist.toml");
        match load_from::<TestParams>(&path) {
            Err(LoadError::FileLoadError(_)) => (),
            _ => panic!("Expected a file load error")
        }
    }
}

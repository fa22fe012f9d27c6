pub use anyhow::{bail, ensure, format_err, Error, Result};
pub use itertools::izip;
pub use log::{debug, info, warn};
pub use serde::{Deserialize, Serialize};
pub use std::{
    borrow::Borrow,
    fmt, fs,
    path::{Path, PathBuf},
    sync::Arc,
};
pub use tch::{
    nn::{self, VarStore},
    Device, Kind, Tensor,
};

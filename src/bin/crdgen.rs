//! Prints the Application, Release and Portal CRDs as multi-document YAML.
//!
//! ```sh
//! cargo run --bin crdgen > config/crd/all.yaml
//! ```

use anyhow::Result;
use kube::CustomResourceExt;
use portal_controller::crd::{Application, Portal, Release};

fn main() -> Result<()> {
    let documents = [
        serde_yaml::to_string(&Application::crd())?,
        serde_yaml::to_string(&Release::crd())?,
        serde_yaml::to_string(&Portal::crd())?,
    ];
    print!("{}", documents.join("---\n"));
    Ok(())
}

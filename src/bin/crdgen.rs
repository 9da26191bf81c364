//! CRD YAML Generator
//!
//! This binary generates Kubernetes CRD manifests for the custom resources
//! defined by the db-backup-operator.
//!
//! Usage: cargo run --bin crdgen > deploy/crds/all.yaml

use db_backup_operator::crd::generate_crds;

fn main() {
    for crd in generate_crds() {
        println!("---");
        print!("{}", crd);
    }
}

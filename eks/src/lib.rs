/*!
  eks provides a `ClusterProvider` backed by the managed node groups of an AWS EKS cluster.
!*/

mod provider;

pub use crate::provider::{EksClusterProvider, EKS_NODEGROUP_LABEL};

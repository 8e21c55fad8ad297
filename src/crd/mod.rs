mod db_cluster;

pub use db_cluster::*;

pub mod lowest_latest;

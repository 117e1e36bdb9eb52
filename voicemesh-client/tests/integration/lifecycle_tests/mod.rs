pub mod test_start_failures;

pub mod test_introduction_initiates;

mod support;

mod test_window_counter;

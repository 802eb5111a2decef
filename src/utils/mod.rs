pub mod fs_size_calculator;

// Integration tests module

mod integration {
    mod engine_test;
    mod store_test;
}

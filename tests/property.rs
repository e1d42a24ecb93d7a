mod common;

mod property {
    mod classify;
    mod duration;
    mod exclusion;
    mod scoring;
}

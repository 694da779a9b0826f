pub(crate) mod async_task;

pub mod singleflight;

pub(crate) mod time;



#[cfg(test)]
mod time_test;

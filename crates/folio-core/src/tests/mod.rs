mod concurrency;
mod failure;

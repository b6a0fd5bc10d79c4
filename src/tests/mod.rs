mod jobs;
mod recommend;
mod support;

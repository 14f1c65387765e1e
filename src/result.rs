extern crate anyhow;

pub type TubeTimesResult<T> = anyhow::Result<T>;

pub fn make_error(msg: &str) -> anyhow::Error {
    return anyhow::anyhow!("{}", msg);
}

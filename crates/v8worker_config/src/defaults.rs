// Various default functions to be used by serde

pub(crate) fn default_true() -> bool {
    true
}

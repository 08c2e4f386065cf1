use crate::platform::Platform;

/// Exclusive use of the transfer unit, borrowed from the host.
///
/// The unit is leased when the guard is created and handed back when it is
/// dropped.
///
/// # Example
///
/// ```ignore
/// {
///     let _lease = TransferLease::new(&platform);
///     op.program(&platform.registers());
/// } // released here
/// ```
pub struct TransferLease<'a, P: Platform> {
    platform: &'a P,
}

impl<'a, P: Platform> TransferLease<'a, P> {
    pub fn new(platform: &'a P) -> Self {
        platform.lease_transfer_unit();
        Self { platform }
    }
}

impl<'a, P: Platform> Drop for TransferLease<'a, P> {
    fn drop(&mut self) {
        self.platform.release_transfer_unit();
    }
}

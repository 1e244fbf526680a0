use super::LcrClient;
use crate::correlator::correlate;
use crate::error::LcrError;
use crate::hioki::protocol;
use crate::hioki::transport::Transport;
use crate::measurement_items::{decode, encode};
use crate::quantity::Quantity;
use crate::types::{CanonicalOrder, EnableMask, MeasurementSet};
use log::{debug, warn};

impl<T: Transport> LcrClient<T> {
    /// Send `:MEAS:ITEM` with `mask`.
    ///
    /// This is a plain write: the instrument does not reliably echo this
    /// command, so it is not verified. The mask is remembered only as an
    /// advisory record; ordering always comes from a live readback.
    pub fn set_measurement_items(&mut self, mask: EnableMask) -> Result<(), LcrError> {
        self.write(&format!("{} {}", protocol::MEASUREMENT_ITEMS, mask.to_args()))?;
        self.cache.last_written_mask = Some(mask);
        Ok(())
    }

    /// Read the live enable mask with `:MEAS:ITEM?`.
    pub fn measurement_items(&mut self) -> Result<EnableMask, LcrError> {
        let reply = self.ask(&protocol::query(protocol::MEASUREMENT_ITEMS))?;
        EnableMask::parse(&reply)
    }

    /// Decode the order of the values the next `:MEAS?` will return,
    /// from a fresh readback of the enable mask.
    pub fn measurement_order(&mut self) -> Result<CanonicalOrder, LcrError> {
        let live = self.measurement_items()?;

        if let Some(written) = self.cache.last_written_mask {
            if written != live {
                warn!("Instrument reports measurement items {live}, last written {written}");
            }
        }

        decode(live)
    }

    /// Measure whatever items are currently enabled on the instrument.
    pub fn read_measurement(&mut self) -> Result<MeasurementSet, LcrError> {
        self.wait_operation_complete()?;
        let order = self.measurement_order()?;

        let reply = self.ask(protocol::MEASURE)?;
        let fields = protocol::split_fields(&reply);
        let set = correlate(&order, &fields)?;

        debug!("Measured {} value(s)", set.len());
        Ok(set)
    }

    /// Enable `quantities`, wait for the instrument, and return one value per
    /// enabled quantity.
    ///
    /// Any failure aborts the whole measurement; nothing is retried here.
    pub fn perform_measurement<I>(&mut self, quantities: I) -> Result<MeasurementSet, LcrError>
    where
        I: IntoIterator<Item = Quantity>,
    {
        self.set_measurement_items(encode(quantities))?;
        self.read_measurement()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hioki::transport::mock::ScriptedTransport;

    #[test]
    fn test_perform_measurement_sequence() {
        let transport = ScriptedTransport::new()
            .reply("*OPC?", "1")
            .reply(":MEAS:ITEM?", "1,2,0")
            .reply(":MEAS?", "1.23450E+02,4.50000E-01");
        let mut client = LcrClient::with_transport(transport);

        let set = client
            .perform_measurement([Quantity::EquivalentSeriesResistance, Quantity::Impedance])
            .unwrap();

        assert_eq!(set.get(Quantity::Impedance), Some(123.45));
        assert_eq!(set.get(Quantity::EquivalentSeriesResistance), Some(0.45));
        assert_eq!(
            client.transport().sent(),
            vec![":MEAS:ITEM 1,2,0", "*OPC?", ":MEAS:ITEM?", ":MEAS?"]
        );
        assert_eq!(
            client.cache().last_written_mask,
            Some(EnableMask::new([1, 2, 0]))
        );
    }

    #[test]
    fn test_order_comes_from_live_mask() {
        // the instrument ignored the request and still reports Z and X
        let transport = ScriptedTransport::new()
            .reply("*OPC?", "1")
            .reply(":MEAS:ITEM?", "1,16,0")
            .reply(":MEAS?", "50.0,-12.5");
        let mut client = LcrClient::with_transport(transport);

        let set = client.perform_measurement([Quantity::Admittance]).unwrap();

        assert_eq!(set.len(), 2);
        assert_eq!(set.get(Quantity::Impedance), Some(50.0));
        assert_eq!(set.get(Quantity::Reactance), Some(-12.5));
        assert!(!set.contains(Quantity::Admittance));
    }

    #[test]
    fn test_all_zero_live_mask() {
        let transport = ScriptedTransport::new()
            .reply("*OPC?", "1")
            .reply(":MEAS:ITEM?", "0,0,0");
        let mut client = LcrClient::with_transport(transport);

        let err = client.perform_measurement(Vec::<Quantity>::new()).unwrap_err();
        assert!(matches!(err, LcrError::NoQuantitiesConfigured));
        // the numeric line is never requested
        assert!(!client.transport().sent().contains(&":MEAS?"));
    }

    #[test]
    fn test_reply_count_mismatch() {
        let transport = ScriptedTransport::new()
            .reply("*OPC?", "1")
            .reply(":MEAS:ITEM?", "1,2,0")
            .reply(":MEAS?", "1.0");
        let mut client = LcrClient::with_transport(transport);

        let err = client
            .perform_measurement([Quantity::Impedance, Quantity::EquivalentSeriesResistance])
            .unwrap_err();
        assert!(matches!(
            err,
            LcrError::ResultCountMismatch {
                expected: 2,
                actual: 1
            }
        ));
    }

    #[test]
    fn test_operation_complete_failure_aborts() {
        let transport = ScriptedTransport::new().reply("*OPC?", "0");
        let mut client = LcrClient::with_transport(transport);

        let err = client.perform_measurement([Quantity::Impedance]).unwrap_err();
        assert!(matches!(err, LcrError::InvalidResponse { .. }));
        assert_eq!(client.transport().sent(), vec![":MEAS:ITEM 1,0,0", "*OPC?"]);
    }

    #[test]
    fn test_read_measurement_without_write() {
        let transport = ScriptedTransport::new()
            .reply("*OPC?", "1")
            .reply(":MEAS:ITEM?", "0,0,2")
            .reply(":MEAS?", "3.1E-11");
        let mut client = LcrClient::with_transport(transport);

        let set = client.read_measurement().unwrap();
        assert_eq!(set.get(Quantity::Permittivity), Some(3.1e-11));
        assert!(client.cache().last_written_mask.is_none());
    }
}

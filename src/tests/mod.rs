// Tests for the injection controller


#[cfg(test)]
mod test_selection_resolver;


#[cfg(test)]
mod test_event_bus;

#[cfg(test)]
mod test_watchdog;

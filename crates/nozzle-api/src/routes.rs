/// Fixed REST endpoints: path to the envelope `origin` tag it serves.
pub const ORIGIN_ENDPOINTS: &[(&str, &str)] = &[
    ("/metron_agents", "MetronAgent"),
    ("/syslog_drains", "syslog_drain_binder"),
    ("/tps_watchers", "tps_watcher"),
    ("/tps_listeners", "tps_listener"),
    ("/stagers", "stager"),
    ("/ssh_proxies", "ssh-proxy"),
    ("/senders", "sender"),
    ("/route_emitters", "route_emitter"),
    ("/reps", "rep"),
    ("/receptors", "receptor"),
    ("/nsync_listeners", "nsync_listener"),
    ("/nsync_bulkers", "nsync_bulker"),
    ("/garden_linuxs", "garden-linux"),
    ("/file_servers", "file_server"),
    ("/fetchers", "fetcher"),
    ("/convergers", "converger"),
    ("/cc_uploaders", "cc_uploader"),
    ("/bbs", "bbs"),
    ("/auctioneers", "auctioneer"),
    ("/etcds", "etcd"),
    ("/doppler_servers", "DopplerServer"),
    ("/cloud_controllers", "cc"),
    ("/traffic_controllers", "LoggregatorTrafficController"),
    ("/gorouters", "gorouter"),
    ("/lockets", "locket"),
];
